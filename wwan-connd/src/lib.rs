use crate::{
    config::DialConfig,
    controller::{ConnectionController, Timings},
    credential::CredentialCheck,
    dialer::DialerSupervisor,
    events::EVENT_CAPACITY,
    modem::Modem,
    netif::SysInterfaceTable,
    service::WwanService,
};
use color_eyre::Result;
use std::{path::Path, sync::Arc};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

pub mod chat_script;
pub mod config;
pub mod controller;
pub mod credential;
pub mod dialer;
pub mod events;
pub mod modem;
pub mod netif;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod state;
pub mod stats;

mod utils;

pub type Tasks = Vec<JoinHandle<Result<()>>>;

/// A running daemon.
pub struct Daemon {
    pub service: WwanService,
    /// The connection service task. Finishing with an error is fatal.
    pub worker: JoinHandle<Result<()>>,
    pub tasks: Tasks,
}

#[bon::builder(finish_fn = run)]
pub async fn program(
    config: DialConfig,
    #[builder(default)] timings: Timings,
    sysfs: impl AsRef<Path>,
    session_bus: zbus::Connection,
    modem: impl Modem,
    credentials: impl CredentialCheck,
) -> Result<Daemon> {
    let modem: Arc<dyn Modem> = Arc::new(modem);

    info!(
        "wwan-connd starting with AT port {} and PPP port {}",
        config.at_port.display(),
        config.ppp_port.display()
    );

    if let Err(e) = modem.probe().await {
        warn!("modem is not answering yet, will retry on connect: {e}");
    }

    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let controller = ConnectionController::builder()
        .modem(modem)
        .dialer(DialerSupervisor::new(events.clone()))
        .netif(SysInterfaceTable::new(sysfs))
        .credentials(credentials)
        .events(events)
        .timings(timings)
        .config(config)
        .build();

    let (service, worker) = WwanService::spawn(controller);
    let tasks = vec![service.clone().serve(session_bus)];

    Ok(Daemon {
        service,
        worker,
        tasks,
    })
}
