use crate::{config::IpVersion, netif::InterfaceAddresses};
use derive_more::Display;
use serde::Serialize;

/// Always computed from the OS, never stored.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn derive(
        addresses: &InterfaceAddresses,
        ip_version: IpVersion,
        dialer_alive: bool,
    ) -> Self {
        if addresses.qualifies(ip_version) {
            ConnectionState::Connected
        } else if dialer_alive {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl From<ConnectionState> for wwan_connd_dbus::ConnectionState {
    fn from(value: ConnectionState) -> Self {
        match value {
            ConnectionState::Disconnected => Self::Disconnected,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Connected,
        }
    }
}
