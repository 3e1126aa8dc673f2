use async_trait::async_trait;
use secrecy::{ExposeSecret as _, SecretString};
use std::{process::Stdio, time::Duration};
use tokio::{io::AsyncWriteExt as _, process::Command, time};
use tracing::{info, warn};

const SUDO_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides whether a credential unlocks the privilege helper.
#[async_trait]
pub trait CredentialCheck: 'static + Send + Sync {
    async fn verify(&self, credential: &SecretString) -> bool;
}

/// Asks `sudo` itself, with a fresh timestamp so a cached login does not count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SudoCredentialCheck;

#[async_trait]
impl CredentialCheck for SudoCredentialCheck {
    async fn verify(&self, credential: &SecretString) -> bool {
        if credential.expose_secret().is_empty() {
            return false;
        }

        let user = uzers::get_current_username()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("<unknown>"));

        let mut child = match Command::new("sudo")
            .args(["-k", "-S", "-p", "", "-v"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = ?e, "failed to run sudo");
                return false;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let fed = async {
                stdin
                    .write_all(credential.expose_secret().as_bytes())
                    .await?;
                stdin.write_all(b"\n").await
            }
            .await;

            if let Err(e) = fed {
                warn!(error = ?e, "failed to pass credential to sudo");
            }
        }

        let accepted = match time::timeout(SUDO_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                warn!(error = ?e, "failed waiting for sudo");
                false
            }
            Err(_) => {
                warn!("sudo did not answer within {}s", SUDO_TIMEOUT.as_secs());
                false
            }
        };

        info!(%user, accepted, "checked sudo credential");

        accepted
    }
}
