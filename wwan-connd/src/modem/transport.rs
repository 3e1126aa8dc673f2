use super::ModemError;
use std::{
    io::{Read, Write},
    path::Path,
    time::Duration,
};

pub const CONTROL_BAUD: u32 = 115_200;

/// Upper bound on how long a single read may block.
pub const READ_QUANTUM: Duration = Duration::from_millis(100);

/// A byte stream to an AT command port.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Opens AT command ports. Swapped out in tests.
pub trait PortOpener: Send + 'static {
    fn open(&self, path: &Path) -> Result<Box<dyn Transport>, ModemError>;
}

/// Opens real tty devices, raw, without becoming their controlling terminal and
/// with exclusive access.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn Transport>, ModemError> {
        let unavailable = |reason: String| ModemError::PortUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable("no such device".into()));
        }

        let mut port = serialport::new(path.to_string_lossy(), CONTROL_BAUD)
            .timeout(READ_QUANTUM)
            .open_native()
            .map_err(|e| unavailable(e.to_string()))?;

        port.set_exclusive(true)
            .map_err(|e| unavailable(e.to_string()))?;

        Ok(Box::new(port))
    }
}

/// Lists serial devices known to the OS.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            tracing::warn!(error = ?e, "failed to enumerate serial ports");
            Vec::new()
        }
    }
}
