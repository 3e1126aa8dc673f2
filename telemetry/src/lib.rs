//! Standardized logging for the wwan daemons.
//!
//! Start with [`TelemetryConfig::new()`]:
//!
//! ```no_run
//! let flusher = wwan_telemetry::TelemetryConfig::new()
//!     .with_journald("wwan-connd")
//!     .init();
//!
//! tracing::info!("hello");
//! flusher.flush_blocking();
//! ```

use std::io::{IsTerminal as _, Write as _};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

/// Target used for lines the dialer process writes to stdout/stderr.
///
/// Consumers can route or silence it with e.g. `RUST_LOG=pppd=warn`.
pub const DIALER_TARGET: &str = "pppd";

/// Errors that can happen while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// The toplevel config for the wwan-telemetry crate. Start here.
#[derive(Debug)]
pub struct TelemetryConfig {
    syslog_identifier: Option<String>,
    global_filter: EnvFilter,
    stderr_targets: Option<Targets>,
}

impl TelemetryConfig {
    /// Logs at `INFO` unless `RUST_LOG` says otherwise.
    #[expect(clippy::new_without_default, reason = "may add required args later")]
    #[must_use]
    pub fn new() -> Self {
        Self {
            syslog_identifier: None,
            global_filter: EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
            stderr_targets: None,
        }
    }

    /// Enables journald, and uses the provided syslog identifier.
    ///
    /// If you run the application in a tty, stderr will be used instead.
    #[must_use]
    pub fn with_journald(self, syslog_identifier: &str) -> Self {
        Self {
            syslog_identifier: Some(syslog_identifier.to_owned()),
            ..self
        }
    }

    /// Override the global filter to a custom filter.
    #[must_use]
    pub fn with_global_filter(self, filter: EnvFilter) -> Self {
        Self {
            global_filter: filter,
            ..self
        }
    }

    /// Restricts what reaches stderr, without affecting journald.
    ///
    /// Handy to keep a noisy dialer out of an interactive terminal.
    #[must_use]
    pub fn with_stderr_targets(self, targets: Targets) -> Self {
        Self {
            stderr_targets: Some(targets),
            ..self
        }
    }

    pub fn try_init(self) -> Result<TelemetryFlusher, TelemetryError> {
        // Checking for a terminal helps detect if we are running under systemd.
        let journald_layer = if !std::io::stderr().is_terminal() {
            self.syslog_identifier.and_then(|syslog_identifier| {
                tracing_journald::layer()
                    .inspect_err(|err| {
                        eprintln!(
                            "failed connecting to journald socket. \
                        will write to stderr: {err}"
                        );
                    })
                    .map(|layer| layer.with_syslog_identifier(syslog_identifier))
                    .ok()
            })
        } else {
            None
        };

        let stderr_layer = journald_layer.is_none().then(|| {
            use tracing_subscriber::Layer as _;

            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(self.stderr_targets)
        });

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(journald_layer)
            .with(self.global_filter)
            .try_init()?;

        Ok(TelemetryFlusher { _priv: () })
    }

    /// Initializes the telemetry config. Call this only once, at the beginning of the
    /// program.
    ///
    /// Calling this more than once or when another tracing subscriber is registered
    /// will cause a panic.
    pub fn init(self) -> TelemetryFlusher {
        self.try_init().expect("failed to initialize wwan-telemetry")
    }
}

/// Allows flushing all logs before the process exits.
#[must_use = "call .flush at the end of the program, otherwise logs may get lost"]
pub struct TelemetryFlusher {
    _priv: (),
}

impl TelemetryFlusher {
    /// Call this at the end of the program.
    pub async fn flush(self) {
        // technically blocks, but no one really cares for stderr/out.
        self.flush_blocking();
    }

    /// Call this at the end of the program.
    pub fn flush_blocking(self) {
        std::io::stderr().flush().ok();
        std::io::stdout().flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_reported_instead_of_panicking() {
        let _ = TelemetryConfig::new().try_init();
        let second = TelemetryConfig::new().try_init();

        assert!(matches!(
            second,
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
