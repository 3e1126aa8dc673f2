use crate::events::{self, Event, OutputStream};
use async_trait::async_trait;
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use secrecy::{ExposeSecret as _, SecretString};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, AsyncWriteExt as _, BufReader},
    process::{Child, Command},
    sync::broadcast,
};
use tracing::{debug, info, warn};

pub const DEFAULT_SHELL: &str = "/bin/bash";

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn dialer {}: {source}", wrapper.display())]
    Spawn {
        wrapper: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to hand the credential to the dialer: {0}")]
    Credential(#[source] io::Error),
}

/// Owner of the external dialer process.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Runs `wrapper`, feeding `credential` to it over stdin.
    async fn start(
        &mut self,
        wrapper: &Path,
        credential: &SecretString,
    ) -> Result<(), SpawnError>;

    /// Asks the dialer to stop, without waiting for it.
    fn terminate(&mut self);

    fn is_running(&mut self) -> bool;
}

/// Spawns the `pppd` wrapper and relays its output as [`Event::DialerOutput`].
pub struct DialerSupervisor {
    shell: PathBuf,
    events: broadcast::Sender<Event>,
    child: Option<Child>,
}

impl DialerSupervisor {
    pub fn new(events: broadcast::Sender<Event>) -> Self {
        Self {
            shell: DEFAULT_SHELL.into(),
            events,
            child: None,
        }
    }

    pub fn with_shell(self, shell: impl AsRef<Path>) -> Self {
        Self {
            shell: shell.as_ref().to_path_buf(),
            ..self
        }
    }
}

#[async_trait]
impl Dialer for DialerSupervisor {
    async fn start(
        &mut self,
        wrapper: &Path,
        credential: &SecretString,
    ) -> Result<(), SpawnError> {
        if self.is_running() {
            warn!("a dialer is still running, stopping it first");
            self.terminate();
        }

        let mut child = Command::new(&self.shell)
            .arg(wrapper)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                wrapper: wrapper.to_path_buf(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let fed = async {
                stdin
                    .write_all(credential.expose_secret().as_bytes())
                    .await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            }
            .await;

            match fed {
                Ok(()) => {}
                // exited without reading it, is_running() will tell
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!("dialer closed stdin before reading the credential");
                }
                Err(e) => {
                    let _ = child.start_kill();
                    return Err(SpawnError::Credential(e));
                }
            }
            // dropping stdin closes it
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                stdout,
                OutputStream::Stdout,
                self.events.clone(),
            ));
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                stderr,
                OutputStream::Stderr,
                self.events.clone(),
            ));
        }

        info!(pid = ?child.id(), "dialer started: {}", wrapper.display());
        self.child = Some(child);

        Ok(())
    }

    fn terminate(&mut self) {
        let Some(child) = self.child.take() else {
            return;
        };

        let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            debug!("dialer already reaped");
            return;
        };

        info!(pid, "terminating dialer");
        for signal in [Signal::SIGTERM, Signal::SIGINT] {
            if let Err(e) = kill(Pid::from_raw(pid), signal) {
                debug!(pid, error = ?e, "failed to send {signal}");
            }
        }

        // the handle is dropped, tokio reaps the orphan
    }

    fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }
}

async fn forward_lines(
    reader: impl AsyncRead + Unpin,
    stream: OutputStream,
    events: broadcast::Sender<Event>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => events::publish(&events, Event::DialerOutput { stream, line }),
            Ok(None) => break,
            Err(e) => {
                warn!(error = ?e, %stream, "failed reading dialer output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("dialer.sh");
        std::fs::write(&path, body).unwrap();

        path
    }

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_owned())
    }

    #[tokio::test]
    async fn relays_output_and_feeds_credential() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = script(
            dir.path(),
            "echo hello\necho oops >&2\nread pw\necho \"got ${#pw}\"\n",
        );
        let (tx, mut rx) = broadcast::channel(16);
        let mut dialer = DialerSupervisor::new(tx).with_shell("/bin/sh");

        dialer.start(&wrapper, &secret("hunter2")).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let event = time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(event);
        }

        let line = |stream, line: &str| Event::DialerOutput {
            stream,
            line: line.to_owned(),
        };
        assert!(seen.contains(&line(OutputStream::Stdout, "hello")));
        assert!(seen.contains(&line(OutputStream::Stderr, "oops")));
        assert!(seen.contains(&line(OutputStream::Stdout, "got 7")));
        assert!(
            seen.iter()
                .all(|e| !matches!(e, Event::DialerOutput { line, .. } if line.contains("hunter2")))
        );
    }

    #[tokio::test]
    async fn terminate_stops_a_running_dialer() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = script(dir.path(), "read pw\nexec sleep 30\n");
        let (tx, _rx) = broadcast::channel(16);
        let mut dialer = DialerSupervisor::new(tx).with_shell("/bin/sh");

        dialer.start(&wrapper, &secret("pw")).await.unwrap();
        assert!(dialer.is_running());

        dialer.terminate();
        assert!(!dialer.is_running());

        // second terminate is a no-op
        dialer.terminate();
    }

    #[tokio::test]
    async fn exited_dialer_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = script(dir.path(), "exit 1\n");
        let (tx, _rx) = broadcast::channel(16);
        let mut dialer = DialerSupervisor::new(tx).with_shell("/bin/sh");

        dialer.start(&wrapper, &secret("pw")).await.unwrap();

        let mut running = true;
        for _ in 0..50 {
            running = dialer.is_running();
            if !running {
                break;
            }
            time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!running);
    }

    #[tokio::test]
    async fn missing_shell_fails_to_spawn() {
        let (tx, _rx) = broadcast::channel(16);
        let mut dialer =
            DialerSupervisor::new(tx).with_shell("/nonexistent/definitely-not-bash");

        let err = dialer
            .start(Path::new("/tmp/run-pppd.sh"), &secret("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SpawnError::Spawn { .. }));
        assert!(!dialer.is_running());
    }
}
