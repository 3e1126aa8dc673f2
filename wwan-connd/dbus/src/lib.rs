use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zbus::{SignalContext, fdo::Result, interface, zvariant::Type};

pub const SERVICE: &str = "org.wwan.Connd";
pub const IFACE: &str = "org.wwan.Connd1";
pub const OBJ_PATH: &str = "/org/wwan/Connd1";

#[async_trait]
pub trait WwanT: 'static + Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn connection_state(&self) -> Result<ConnectionState>;
    async fn signal_strength(&self) -> Result<Option<SignalStrength>>;
    async fn operator_name(&self) -> Result<String>;
    async fn data_usage(&self) -> Result<String>;
    async fn current_throughput(&self) -> Result<String>;
    async fn connection_duration(&self) -> Result<String>;
    async fn modem_info(&self) -> Result<ModemInfo>;
    async fn scan_operators(&self) -> Result<Vec<Operator>>;
    async fn available_ports(&self) -> Result<Vec<String>>;
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Type,
    derive_more::Display,
)]
#[zvariant(signature = "s")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// `level` is one of `None`, `Poor`, `Fair`, `Good`, `Excellent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct SignalStrength {
    pub level: String,
    pub rssi: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct ModemInfo {
    pub model: String,
    pub firmware: String,
    pub imei: String,
    pub serial: String,
    pub sim_status: String,
    pub subscriber_number: String,
    pub registration: String,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct Operator {
    pub name: String,
    /// Numeric MCC/MNC, `"0"` for automatic selection.
    pub id: String,
}

#[derive(Debug, derive_more::From)]
pub struct Wwan<T>(pub T);

/// Besides the methods, the interface carries the daemon's asynchronous events as
/// signals: `StateChanged`, `ConnectTimeout`, `DialerExited` and `DialerOutput`.
#[interface(
    name = "org.wwan.Connd1",
    proxy(default_service = "org.wwan.Connd", default_path = "/org/wwan/Connd1",)
)]
impl<T: WwanT> Wwan<T> {
    async fn connect(&self) -> Result<()> {
        self.0.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.0.disconnect().await
    }

    async fn connection_state(&self) -> Result<ConnectionState> {
        self.0.connection_state().await
    }

    async fn signal_strength(&self) -> Result<Option<SignalStrength>> {
        self.0.signal_strength().await
    }

    async fn operator_name(&self) -> Result<String> {
        self.0.operator_name().await
    }

    async fn data_usage(&self) -> Result<String> {
        self.0.data_usage().await
    }

    async fn current_throughput(&self) -> Result<String> {
        self.0.current_throughput().await
    }

    async fn connection_duration(&self) -> Result<String> {
        self.0.connection_duration().await
    }

    async fn modem_info(&self) -> Result<ModemInfo> {
        self.0.modem_info().await
    }

    async fn scan_operators(&self) -> Result<Vec<Operator>> {
        self.0.scan_operators().await
    }

    async fn available_ports(&self) -> Result<Vec<String>> {
        self.0.available_ports().await
    }

    #[zbus(signal)]
    pub async fn state_changed(
        ctxt: &SignalContext<'_>,
        state: ConnectionState,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn connect_timeout(ctxt: &SignalContext<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn dialer_exited(ctxt: &SignalContext<'_>) -> zbus::Result<()>;

    /// One line of dialer output, `stream` is `stdout` or `stderr`.
    #[zbus(signal)]
    pub async fn dialer_output(
        ctxt: &SignalContext<'_>,
        stream: &str,
        line: &str,
    ) -> zbus::Result<()>;
}
