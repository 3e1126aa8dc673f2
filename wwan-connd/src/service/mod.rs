//! The single task owning the [`ConnectionController`].
//!
//! Every caller talks to it through a cloneable [`WwanService`]. Requests are
//! handled one at a time, in between the controller's ticks, so nothing in the
//! controller needs a lock.

use crate::{
    config::{ConnectTimeoutPolicy, DialConfig},
    controller::{AttemptOutcome, ConnectError, ConnectionController},
    events::Event,
    modem::{Modem, ModemError, ModemInfo, OperatorEntry, SignalSample, transport},
    state::ConnectionState,
    stats::SessionStatistics,
};
use color_eyre::{Result, eyre::WrapErr as _};
use flume::{Receiver, Sender};
use std::sync::Arc;
use tokio::{
    sync::{broadcast, oneshot},
    task::{self, JoinHandle},
    time::{self, Instant},
};
use tracing::{info, warn};

mod dbus;

enum Request {
    Connect(oneshot::Sender<Result<(), ConnectError>>),
    Disconnect(oneshot::Sender<()>),
    State(oneshot::Sender<ConnectionState>),
    Statistics(oneshot::Sender<SessionStatistics>),
    UpdateConfig(Box<DialConfig>, oneshot::Sender<Result<(), ConnectError>>),
}

#[derive(Clone)]
pub struct WwanService {
    tx: Sender<Request>,
    modem: Arc<dyn Modem>,
    events: broadcast::Sender<Event>,
}

impl WwanService {
    /// Moves `controller` into a new task. The task ends with an error only when an
    /// attempt times out under [`ConnectTimeoutPolicy::Exit`].
    pub fn spawn(controller: ConnectionController) -> (Self, JoinHandle<Result<()>>) {
        let (tx, rx) = flume::unbounded();
        let service = Self {
            tx,
            modem: controller.modem(),
            events: controller.events().clone(),
        };

        (service, task::spawn(run(controller, rx)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.request(Request::Connect).await?
    }

    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        self.request(Request::Disconnect).await
    }

    pub async fn connection_state(&self) -> Result<ConnectionState, ConnectError> {
        self.request(Request::State).await
    }

    pub async fn statistics(&self) -> Result<SessionStatistics, ConnectError> {
        self.request(Request::Statistics).await
    }

    pub async fn data_usage(&self) -> Result<String, ConnectError> {
        Ok(self.statistics().await?.usage())
    }

    pub async fn current_throughput(&self) -> Result<String, ConnectError> {
        Ok(self.statistics().await?.throughput())
    }

    pub async fn connection_duration(&self) -> Result<String, ConnectError> {
        Ok(self.statistics().await?.duration())
    }

    /// Takes effect on the next `connect`. Refused while a connection is up.
    pub async fn update_config(&self, config: DialConfig) -> Result<(), ConnectError> {
        self.request(|reply| Request::UpdateConfig(Box::new(config), reply))
            .await?
    }

    pub async fn signal_strength(&self) -> Option<SignalSample> {
        self.modem.signal_strength().await
    }

    pub async fn operator_name(&self) -> String {
        self.modem.operator_name().await
    }

    pub async fn modem_info(&self) -> ModemInfo {
        self.modem.modem_info().await
    }

    pub async fn scan_operators(&self) -> Result<Vec<OperatorEntry>, ModemError> {
        self.modem.scan_operators().await
    }

    pub async fn available_ports(&self) -> Vec<String> {
        task::spawn_blocking(transport::available_ports)
            .await
            .unwrap_or_else(|e| {
                warn!(error = ?e, "port enumeration panicked");
                Vec::new()
            })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send_async(make(reply))
            .await
            .map_err(|_| ConnectError::ServiceGone)?;

        rx.await.map_err(|_| ConnectError::ServiceGone)
    }
}

async fn run(mut controller: ConnectionController, rx: Receiver<Request>) -> Result<()> {
    info!("connection service started");

    loop {
        let deadline = controller.next_deadline();

        tokio::select! {
            req = rx.recv_async() => {
                let Ok(req) = req else {
                    break;
                };
                handle(&mut controller, req).await;
            }

            _ = sleep_until(deadline) => {
                let outcome = controller.tick(Instant::now()).await;

                if outcome == AttemptOutcome::TimedOut
                    && controller.timeout_policy() == ConnectTimeoutPolicy::Exit
                {
                    return Err(ConnectError::ConnectTimeout)
                        .wrap_err("giving up, connect timeout policy is `exit`");
                }
            }
        }
    }

    info!("every service handle dropped, stopping connection service");

    Ok(())
}

async fn handle(controller: &mut ConnectionController, req: Request) {
    match req {
        Request::Connect(reply) => {
            let res = controller.connect().await;
            if let Err(e) = &res {
                warn!("connect refused: {e}");
            }
            let _ = reply.send(res);
        }

        Request::Disconnect(reply) => {
            controller.disconnect().await;
            let _ = reply.send(());
        }

        Request::State(reply) => {
            let _ = reply.send(controller.connection_state());
        }

        Request::Statistics(reply) => {
            let _ = reply.send(controller.statistics().clone());
        }

        Request::UpdateConfig(config, reply) => {
            let _ = reply.send(controller.set_config(*config));
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
