//! AT command channel to the modem's control port.
//!
//! [`ModemChannel`] is plain blocking code and is owned by exactly one worker thread,
//! reached through the cloneable [`ModemHandle`]. The rest of the daemon only sees
//! the [`Modem`] trait.

pub mod handle;
pub mod info;
pub mod response;
pub mod signal;
pub mod transport;

pub use handle::ModemHandle;
pub use info::{ModemInfo, OperatorEntry};
pub use signal::{SignalLevel, SignalSample};

use async_trait::async_trait;
use response::{NO_RESPONSE, clean_response, first_quoted};
use std::{
    io::{self, ErrorKind, Read as _, Write as _},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};
use transport::{PortOpener, READ_QUANTUM, Transport};

/// How long a regular query listens for an answer.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Network scans are slow, modems commonly need most of a minute.
pub const SCAN_READ_TIMEOUT: Duration = Duration::from_secs(60);

const WAKE_UP_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    #[error("modem port {} unavailable: {reason}", path.display())]
    PortUnavailable { path: PathBuf, reason: String },
    #[error("modem did not answer `{command}` as expected, got `{response}`")]
    Unresponsive { command: String, response: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("modem worker is no longer running")]
    WorkerGone,
}

/// The modem as seen by the connection logic.
#[async_trait]
pub trait Modem: 'static + Send + Sync {
    /// (Re)opens the control port.
    async fn open(&self) -> Result<(), ModemError>;

    async fn signal_strength(&self) -> Option<SignalSample>;

    /// Re-reads the registered operator and remembers it, empty if unknown.
    async fn update_operator_name(&self) -> String;

    /// Last value seen by [`Modem::update_operator_name`].
    async fn operator_name(&self) -> String;

    /// Full functionality reset (`AT+CFUN=1,1`); the port is closed afterwards.
    async fn reset(&self) -> Result<(), ModemError>;

    async fn probe(&self) -> Result<(), ModemError>;

    async fn modem_info(&self) -> ModemInfo;

    async fn scan_operators(&self) -> Result<Vec<OperatorEntry>, ModemError>;
}

/// Exclusive owner of the AT port.
pub struct ModemChannel {
    path: PathBuf,
    opener: Box<dyn PortOpener>,
    port: Option<Box<dyn Transport>>,
    operator_name: String,
}

impl ModemChannel {
    pub fn new(path: impl AsRef<Path>, opener: impl PortOpener) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            opener: Box::new(opener),
            port: None,
            operator_name: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub fn open(&mut self) -> Result<(), ModemError> {
        self.close();
        self.port = Some(self.opener.open(&self.path)?);
        info!("AT port opened: {}", self.path.display());

        Ok(())
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("AT port closed: {}", self.path.display());
        }
    }

    /// No-op unless open.
    pub fn send(&mut self, command: &str) {
        let Some(port) = self.port.as_mut() else {
            return;
        };

        debug!(command, "-> modem");
        let line = format!("{command}\r");
        if let Err(e) = port.write_all(line.as_bytes()).and_then(|_| port.flush()) {
            warn!(error = ?e, "failed writing `{command}` to modem");
        }
    }

    /// Collects whatever arrives within `timeout`. `None` if the port is not open.
    pub fn read_response(&mut self, timeout: Duration) -> Option<String> {
        let port = self.port.as_mut()?;
        let start = Instant::now();
        let mut buf = [0u8; 1024];
        let mut raw = Vec::new();

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }

            match port.read(&mut buf) {
                Ok(n) if n > 0 => raw.extend_from_slice(&buf[..n]),
                // the read itself already waited a quantum
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Ok(_) | Err(_) => {
                    thread::sleep(READ_QUANTUM.min(timeout - elapsed));
                }
            }
        }

        let response = clean_response(&String::from_utf8_lossy(&raw));
        debug!(%response, "<- modem");

        Some(response)
    }

    pub fn send_and_read(&mut self, command: &str, timeout: Duration) -> String {
        if !self.is_open()
            && let Err(e) = self.open()
        {
            warn!("{e}");
        }

        self.send(command);

        self.read_response(timeout)
            .unwrap_or_else(|| NO_RESPONSE.to_owned())
    }

    pub fn signal_strength(&mut self) -> Option<SignalSample> {
        signal::parse_csq(&self.send_and_read("AT+CSQ", DEFAULT_READ_TIMEOUT))
    }

    pub fn update_operator_name(&mut self) -> String {
        let response = self.send_and_read("AT+COPS?", DEFAULT_READ_TIMEOUT);
        self.operator_name = first_quoted(&response).unwrap_or_default().to_owned();

        self.operator_name.clone()
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn reset(&mut self) -> Result<(), ModemError> {
        if !self.is_open() {
            self.open()?;
        }

        info!("resetting modem");
        self.send("AT+CFUN=1,1");
        self.close();

        Ok(())
    }

    pub fn probe(&mut self) -> Result<(), ModemError> {
        let response = self.send_and_read("AT", DEFAULT_READ_TIMEOUT);

        if response.lines().any(|line| line == "OK") {
            Ok(())
        } else {
            Err(ModemError::Unresponsive {
                command: "AT".into(),
                response,
            })
        }
    }

    pub fn modem_info(&mut self) -> ModemInfo {
        if !self.is_open() && self.open().is_ok() {
            // some modems swallow the first command after the port opens
            let _ = self.send_and_read("AT", DEFAULT_READ_TIMEOUT);
        }

        let responses = info::INFO_QUERIES
            .map(|query| self.send_and_read(query, DEFAULT_READ_TIMEOUT));

        ModemInfo::from_responses(responses)
    }

    pub fn scan_operators(&mut self) -> Result<Vec<OperatorEntry>, ModemError> {
        self.scan_operators_with_timeout(SCAN_READ_TIMEOUT)
    }

    fn scan_operators_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<OperatorEntry>, ModemError> {
        let cfun = self.send_and_read("AT+CFUN?", DEFAULT_READ_TIMEOUT);
        if !cfun.contains("+CFUN: 1") {
            let response = self.send_and_read("AT+CFUN=1", DEFAULT_READ_TIMEOUT);
            if !response.lines().any(|line| line == "OK") {
                return Err(ModemError::Unresponsive {
                    command: "AT+CFUN=1".into(),
                    response,
                });
            }

            thread::sleep(WAKE_UP_DELAY);
        }

        info!("scanning for operators, this may take a while");
        let response = self.send_and_read("AT+COPS=?", timeout);

        Ok(info::parse_operator_list(&response))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeAtPort, MissingPort};
    use super::*;

    const QUICK: Duration = Duration::from_millis(20);

    #[test]
    fn send_is_noop_when_closed() {
        let port = FakeAtPort::default();
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port.clone());

        channel.send("AT");

        assert!(port.written().is_empty());
        assert_eq!(channel.read_response(QUICK), None);
    }

    #[test]
    fn send_and_read_opens_once_and_strips_echo() {
        let port = FakeAtPort::answering(&["+CSQ: 21,99\r\n\r\nOK\r\n", "OK\r\n"]);
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port.clone());

        assert_eq!(channel.send_and_read("AT+CSQ", QUICK), "+CSQ: 21,99\nOK");
        assert_eq!(channel.send_and_read("AT", QUICK), "OK");
        assert_eq!(port.opens(), 1);
        assert_eq!(port.written(), vec!["AT+CSQ", "AT"]);
    }

    #[test]
    fn unopenable_port_has_no_response() {
        let mut channel = ModemChannel::new("/dev/ttyUSB2", MissingPort);

        assert_eq!(channel.send_and_read("AT", QUICK), NO_RESPONSE);
        assert!(matches!(
            channel.open(),
            Err(ModemError::PortUnavailable { .. })
        ));
    }

    #[test]
    fn read_respects_timeout() {
        let mut channel = ModemChannel::new("/dev/ttyUSB2", FakeAtPort::default());
        channel.open().unwrap();

        let start = Instant::now();
        assert_eq!(channel.read_response(Duration::from_millis(250)), Some(String::new()));
        assert!(start.elapsed() < Duration::from_millis(250) + READ_QUANTUM * 2);
    }

    #[test]
    fn operator_name_always_overwritten() {
        let port = FakeAtPort::answering(&[
            "+COPS: 0,0,\"Telekom.de\",7\r\nOK\r\n",
            "+COPS: 0\r\nOK\r\n",
        ]);
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port);

        assert_eq!(channel.update_operator_name(), "Telekom.de");
        assert_eq!(channel.operator_name(), "Telekom.de");
        assert_eq!(channel.update_operator_name(), "");
        assert_eq!(channel.operator_name(), "");
    }

    #[test]
    fn signal_strength_parses_csq() {
        let port = FakeAtPort::answering(&["+CSQ: 28,99\r\nOK\r\n", "ERROR\r\n"]);
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port);

        let sample = channel.signal_strength().unwrap();
        assert_eq!(sample.rssi, 28);
        assert_eq!(sample.level, SignalLevel::Excellent);
        assert_eq!(channel.signal_strength(), None);
    }

    #[test]
    fn reset_sends_cfun_and_closes() {
        let port = FakeAtPort::default();
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port.clone());

        channel.reset().unwrap();

        assert_eq!(port.written(), vec!["AT+CFUN=1,1"]);
        assert!(!channel.is_open());
    }

    #[test]
    fn probe_wants_ok() {
        let port = FakeAtPort::answering(&["OK\r\n", "ERROR\r\n"]);
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port);

        channel.probe().unwrap();
        assert!(matches!(
            channel.probe(),
            Err(ModemError::Unresponsive { .. })
        ));
    }

    #[test]
    fn scan_skips_wake_up_when_already_functional() {
        let port = FakeAtPort::answering(&[
            "+CFUN: 1\r\nOK\r\n",
            "+COPS: (2,\"Vodafone.de\",\"Vodafone\",\"26202\",7),,(0-4),(0-2)\r\nOK\r\n",
        ]);
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port.clone());

        let ops = channel.scan_operators_with_timeout(QUICK).unwrap();

        assert_eq!(port.written(), vec!["AT+CFUN?", "AT+COPS=?"]);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].id, "26202");
    }

    #[test]
    fn scan_fails_when_modem_refuses_to_wake() {
        let port = FakeAtPort::answering(&["+CFUN: 4\r\nOK\r\n", "ERROR\r\n"]);
        let mut channel = ModemChannel::new("/dev/ttyUSB2", port);

        assert!(matches!(
            channel.scan_operators_with_timeout(QUICK),
            Err(ModemError::Unresponsive { .. })
        ));
    }
}
