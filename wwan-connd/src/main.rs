use clap::Parser as _;
use color_eyre::eyre::{Result, WrapErr as _};
use std::{borrow::Cow, path::Path};
use tokio::signal::unix::{self, SignalKind};
use tracing::{error, info, warn};
use wwan_connd::{
    credential::SudoCredentialCheck,
    modem::{ModemChannel, ModemHandle, transport::SerialOpener},
    settings::{Args, Settings},
};

const CFG_DEFAULT_PATH: &str = "/etc/wwan_connd.conf";
const ENV_VAR_PREFIX: &str = "WWAN_CONND_";
const CFG_ENV_VAR: &str = const_format::concatcp!(ENV_VAR_PREFIX, "CONFIG");
const SYSLOG_IDENTIFIER: &str = "wwan-connd";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let tel_flusher = wwan_telemetry::TelemetryConfig::new()
        .with_journald(SYSLOG_IDENTIFIER)
        .init();

    let args = Args::parse();

    let result = async {
        let config_path = get_config_source(&args);
        let settings = Settings::get(&args, config_path, ENV_VAR_PREFIX)
            .wrap_err("failed reading settings")?;

        let config = settings.dial_config().wrap_err("invalid dial settings")?;
        info!("running with {config:?}");

        let modem = ModemHandle::spawn(ModemChannel::new(&config.at_port, SerialOpener));

        let mut daemon = wwan_connd::program()
            .config(config)
            .timings(settings.timings())
            .sysfs("/sys")
            .session_bus(zbus::Connection::session().await?)
            .modem(modem)
            .credentials(SudoCredentialCheck)
            .run()
            .await?;

        let mut sigterm = unix::signal(SignalKind::terminate())?;
        let mut sigint = unix::signal(SignalKind::interrupt())?;

        let outcome = tokio::select! {
            _ = sigterm.recv() => {
                warn!("received SIGTERM");
                Ok(())
            }
            _ = sigint.recv() => {
                warn!("received SIGINT");
                Ok(())
            }
            res = &mut daemon.worker => {
                res.wrap_err("connection service panicked").and_then(|res| res)
            }
        };

        info!("disconnecting and exiting");

        if let Err(e) = daemon.service.disconnect().await {
            error!("final disconnect failed: {e}");
        }

        daemon.worker.abort();
        for handle in daemon.tasks {
            handle.abort();
        }

        outcome
    }
    .await;

    tel_flusher.flush().await;

    result
}

fn get_config_source(args: &Args) -> Cow<'_, Path> {
    if let Some(config) = &args.config {
        info!("using config provided by command line argument: `{config}`");
        Cow::Borrowed(config.as_ref())
    } else if let Some(config) = figment::providers::Env::var(CFG_ENV_VAR) {
        info!("using config set in environment variable `{CFG_ENV_VAR}={config}`");
        Cow::Owned(std::path::PathBuf::from(config))
    } else {
        info!("using default config at `{CFG_DEFAULT_PATH}`");
        Cow::Borrowed(CFG_DEFAULT_PATH.as_ref())
    }
}
