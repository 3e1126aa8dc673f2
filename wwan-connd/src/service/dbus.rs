use super::WwanService;
use crate::{
    events::Event,
    modem::{ModemInfo, OperatorEntry, SignalSample},
    utils::IntoZResult,
};
use async_trait::async_trait;
use color_eyre::Result;
use tokio::{
    sync::broadcast::error::RecvError,
    task::{self, JoinHandle},
};
use tracing::{error, info, warn};
use wwan_connd_dbus::{self as api, OBJ_PATH, SERVICE, Wwan, WwanT};
use zbus::{SignalContext, fdo::Result as ZResult};

impl WwanService {
    /// Exports the service on `conn` and relays every [`Event`] as a signal until the
    /// task is aborted.
    pub fn serve(self, conn: zbus::Connection) -> JoinHandle<Result<()>> {
        info!("spawning dbus service {SERVICE} at path {OBJ_PATH}");
        let mut events = self.subscribe();

        task::spawn(async move {
            conn.request_name(SERVICE)
                .await
                .inspect_err(|e| error!("failed to request name on dbus {e}"))?;

            conn.object_server()
                .at(OBJ_PATH, Wwan(self))
                .await
                .inspect_err(|e| error!("failed to serve obj on dbus {e}"))?;

            info!("dbus service spawned successfully");

            let ctxt = SignalContext::new(&conn, OBJ_PATH)?;
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = emit(&ctxt, &event).await {
                            warn!(error = ?e, "failed to emit {event:?} on dbus");
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("dbus relay fell behind, dropped {n} events")
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
        })
    }
}

async fn emit(ctxt: &SignalContext<'_>, event: &Event) -> zbus::Result<()> {
    type Iface = Wwan<WwanService>;

    match event {
        Event::StateChanged(state) => Iface::state_changed(ctxt, (*state).into()).await,
        Event::ConnectTimeout => Iface::connect_timeout(ctxt).await,
        Event::DialerExited => Iface::dialer_exited(ctxt).await,
        Event::DialerOutput { stream, line } => {
            Iface::dialer_output(ctxt, &stream.to_string(), line).await
        }
    }
}

#[async_trait]
impl WwanT for WwanService {
    async fn connect(&self) -> ZResult<()> {
        WwanService::connect(self).await.into_z()
    }

    async fn disconnect(&self) -> ZResult<()> {
        WwanService::disconnect(self).await.into_z()
    }

    async fn connection_state(&self) -> ZResult<api::ConnectionState> {
        WwanService::connection_state(self)
            .await
            .map(Into::into)
            .into_z()
    }

    async fn signal_strength(&self) -> ZResult<Option<api::SignalStrength>> {
        Ok(WwanService::signal_strength(self).await.map(Into::into))
    }

    async fn operator_name(&self) -> ZResult<String> {
        Ok(WwanService::operator_name(self).await)
    }

    async fn data_usage(&self) -> ZResult<String> {
        WwanService::data_usage(self).await.into_z()
    }

    async fn current_throughput(&self) -> ZResult<String> {
        WwanService::current_throughput(self).await.into_z()
    }

    async fn connection_duration(&self) -> ZResult<String> {
        WwanService::connection_duration(self).await.into_z()
    }

    async fn modem_info(&self) -> ZResult<api::ModemInfo> {
        Ok(WwanService::modem_info(self).await.into())
    }

    async fn scan_operators(&self) -> ZResult<Vec<api::Operator>> {
        let operators = WwanService::scan_operators(self).await.into_z()?;

        Ok(operators.into_iter().map(Into::into).collect())
    }

    async fn available_ports(&self) -> ZResult<Vec<String>> {
        Ok(WwanService::available_ports(self).await)
    }
}

impl From<SignalSample> for api::SignalStrength {
    fn from(value: SignalSample) -> Self {
        Self {
            level: value.level.to_string(),
            rssi: value.rssi,
        }
    }
}

impl From<ModemInfo> for api::ModemInfo {
    fn from(value: ModemInfo) -> Self {
        Self {
            model: value.model,
            firmware: value.firmware,
            imei: value.imei,
            serial: value.serial,
            sim_status: value.sim_status,
            subscriber_number: value.subscriber_number,
            registration: value.registration,
            operator: value.operator,
        }
    }
}

impl From<OperatorEntry> for api::Operator {
    fn from(value: OperatorEntry) -> Self {
        Self {
            name: value.name,
            id: value.id,
        }
    }
}
