use crate::state::ConnectionState;
use derive_more::Display;
use tokio::sync::broadcast;
use tracing::{info, warn};
use wwan_telemetry::DIALER_TARGET;

/// Capacity of the event channel. Slow subscribers lag, they never block the daemon.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A line the dialer process wrote.
    DialerOutput { stream: OutputStream, line: String },
    StateChanged(ConnectionState),
    /// The attempt ran out of time and was torn down.
    ConnectTimeout,
    /// The dialer died before the link came up.
    DialerExited,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    #[display("stdout")]
    Stdout,
    #[display("stderr")]
    Stderr,
}

/// Logs `event` and hands it to whoever is subscribed.
pub fn publish(tx: &broadcast::Sender<Event>, event: Event) {
    match &event {
        Event::DialerOutput { stream, line } => {
            info!(target: DIALER_TARGET, %stream, "{line}");
        }
        Event::StateChanged(state) => info!("connection state changed to {state}"),
        Event::ConnectTimeout => warn!("connection attempt timed out"),
        Event::DialerExited => warn!("dialer exited before the link came up"),
    }

    // no subscribers is fine
    let _ = tx.send(event);
}
