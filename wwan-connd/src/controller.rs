//! The PPP connection state machine.
//!
//! The controller never stores the connection state. It asks the interface table
//! and the dialer every time, and only keeps what an ongoing attempt or session
//! needs to be timed.

use crate::{
    chat_script::{self, ScriptPaths},
    config::{ConnectTimeoutPolicy, DialConfig, InvalidDialConfig},
    credential::CredentialCheck,
    dialer::{Dialer, SpawnError},
    events::{self, Event},
    modem::Modem,
    netif::InterfaceTable,
    scheduler::RepeatingTask,
    state::ConnectionState,
    stats::{SessionStatistics, StatisticsSampler},
};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    fs,
    sync::broadcast,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How often a pending attempt looks for an address.
    pub attempt_period: Duration,
    /// How long an attempt may take before it is torn down.
    pub attempt_budget: Duration,
    pub stats_period: Duration,
    /// Pause between the modem reset and stopping the dialer on disconnect.
    pub settle_delay: Duration,
    /// How long to wait on a modem answer before carrying on without it. The modem
    /// worker may be stuck in a slow scan.
    pub modem_reply: Duration,
}

impl Timings {
    pub const DEFAULT_ATTEMPT_PERIOD: Duration = Duration::from_secs(5);
    pub const DEFAULT_ATTEMPT_BUDGET: Duration = Duration::from_secs(60);
    pub const DEFAULT_STATS_PERIOD: Duration = Duration::from_secs(1);
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_MODEM_REPLY: Duration = Duration::from_secs(2);
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            attempt_period: Self::DEFAULT_ATTEMPT_PERIOD,
            attempt_budget: Self::DEFAULT_ATTEMPT_BUDGET,
            stats_period: Self::DEFAULT_STATS_PERIOD,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
            modem_reply: Self::DEFAULT_MODEM_REPLY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection is already {0}")]
    AlreadyActive(ConnectionState),
    #[error(transparent)]
    InvalidConfig(#[from] InvalidDialConfig),
    #[error("modem port missing: {}", display_paths(ports))]
    PortMissing { ports: Vec<PathBuf> },
    #[error("sudo credential missing or rejected")]
    InvalidCredential,
    #[error("failed to write dial scripts: {0}")]
    ScriptWrite(#[source] io::Error),
    #[error(transparent)]
    SpawnFailed(#[from] SpawnError),
    #[error("connection attempt timed out")]
    ConnectTimeout,
    #[error("connection service is no longer running")]
    ServiceGone,
}

fn display_paths(ports: &[PathBuf]) -> String {
    ports
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What a tick did to the pending attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// No attempt in progress.
    Idle,
    Pending,
    Connected,
    TimedOut,
    DialerExited,
}

#[derive(Debug)]
struct ConnectionAttempt {
    started: Instant,
    task: RepeatingTask,
}

pub struct ConnectionController {
    config: DialConfig,
    modem: Arc<dyn Modem>,
    dialer: Box<dyn Dialer>,
    netif: Box<dyn InterfaceTable>,
    credentials: Box<dyn CredentialCheck>,
    paths: ScriptPaths,
    attempt: Option<ConnectionAttempt>,
    sampler: StatisticsSampler,
    sampling: RepeatingTask,
    events: broadcast::Sender<Event>,
    timings: Timings,
    published: ConnectionState,
}

#[bon::bon]
impl ConnectionController {
    #[builder]
    pub fn new(
        config: DialConfig,
        modem: Arc<dyn Modem>,
        dialer: impl Dialer,
        netif: impl InterfaceTable,
        credentials: impl CredentialCheck,
        events: broadcast::Sender<Event>,
        #[builder(default)] timings: Timings,
    ) -> Self {
        let paths = ScriptPaths::in_dir(&config.script_dir);

        Self {
            config,
            modem,
            dialer: Box::new(dialer),
            netif: Box::new(netif),
            credentials: Box::new(credentials),
            paths,
            attempt: None,
            sampler: StatisticsSampler::new(),
            sampling: RepeatingTask::new(timings.stats_period),
            events,
            timings,
            published: ConnectionState::Disconnected,
        }
    }

    pub fn config(&self) -> &DialConfig {
        &self.config
    }

    pub fn timeout_policy(&self) -> ConnectTimeoutPolicy {
        self.config.timeout_policy
    }

    pub fn modem(&self) -> Arc<dyn Modem> {
        Arc::clone(&self.modem)
    }

    pub fn events(&self) -> &broadcast::Sender<Event> {
        &self.events
    }

    pub fn statistics(&self) -> &SessionStatistics {
        self.sampler.stats()
    }

    pub fn connection_state(&mut self) -> ConnectionState {
        let addresses = self.netif.addresses(&self.config.interface);

        ConnectionState::derive(
            &addresses,
            self.config.ip_version,
            self.dialer.is_running(),
        )
    }

    /// Swaps the dial configuration. Only allowed while disconnected, the scripts of
    /// a running session live under the old script dir.
    pub fn set_config(&mut self, config: DialConfig) -> Result<(), ConnectError> {
        let state = self.connection_state();
        if state != ConnectionState::Disconnected {
            return Err(ConnectError::AlreadyActive(state));
        }
        config.validate()?;

        info!(?config, "dial configuration updated");
        self.paths = ScriptPaths::in_dir(&config.script_dir);
        self.config = config;

        Ok(())
    }

    /// Starts dialing and returns as soon as the dialer runs. The outcome is reported
    /// later by [`ConnectionController::tick`].
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let state = self.connection_state();
        if state != ConnectionState::Disconnected {
            return Err(ConnectError::AlreadyActive(state));
        }

        let mut missing = Vec::new();
        for port in [&self.config.at_port, &self.config.ppp_port] {
            if !fs::try_exists(port).await.unwrap_or(false) {
                missing.push(port.clone());
            }
        }
        if !missing.is_empty() {
            return Err(ConnectError::PortMissing { ports: missing });
        }

        let Some(credential) = self.config.credential.clone() else {
            return Err(ConnectError::InvalidCredential);
        };
        if !self.credentials.verify(&credential).await {
            return Err(ConnectError::InvalidCredential);
        }

        match time::timeout(self.timings.modem_reply, self.modem.open()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = ?e, "modem control port unavailable, dialing anyway"),
            Err(_) => warn!("modem busy, dialing anyway"),
        }

        let scripts = chat_script::build(&self.config, &self.paths);
        if let Err(e) = chat_script::write(&scripts, &self.paths).await {
            chat_script::remove(&self.paths).await;
            return Err(ConnectError::ScriptWrite(e));
        }

        if let Err(e) = self.dialer.start(&self.paths.wrapper, &credential).await {
            chat_script::remove(&self.paths).await;
            return Err(e.into());
        }

        self.arm_attempt(Instant::now());
        self.sampler.stop();
        self.sampling.cancel();

        let operator = self.refresh_operator_name().await;
        info!(
            apn = %self.config.apn,
            %operator,
            ip_version = ?self.config.ip_version,
            "dialing over {}",
            self.config.ppp_port.display()
        );
        self.publish_state();

        Ok(())
    }

    /// Tears everything down. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        info!("disconnecting");

        self.reset_modem();
        time::sleep(self.timings.settle_delay).await;

        self.dialer.terminate();
        chat_script::remove(&self.paths).await;
        self.attempt = None;
        self.sampler.stop();
        self.sampling.cancel();

        self.publish_state();
    }

    /// Earliest instant at which [`ConnectionController::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let attempt = self.attempt.as_ref().and_then(|a| a.task.deadline());
        let sampling = self.sampling.deadline();

        match (attempt, sampling) {
            (Some(a), Some(s)) => Some(a.min(s)),
            (a, s) => a.or(s),
        }
    }

    /// Runs whatever is due at `now`.
    pub async fn tick(&mut self, now: Instant) -> AttemptOutcome {
        let outcome = self.tick_attempt(now).await;
        self.tick_sampler(now);

        outcome
    }

    async fn tick_attempt(&mut self, now: Instant) -> AttemptOutcome {
        let Some(attempt) = self.attempt.as_mut() else {
            return AttemptOutcome::Idle;
        };

        if !attempt.task.poll_tick(now) {
            return AttemptOutcome::Pending;
        }

        let elapsed = now.saturating_duration_since(attempt.started);
        let addresses = self.netif.addresses(&self.config.interface);
        debug!(?addresses, ?elapsed, "checking {}", self.config.interface);

        if addresses.qualifies(self.config.ip_version) {
            self.attempt = None;
            self.sampler.start(now);
            self.sampling.start(now);
            chat_script::remove(&self.paths).await;

            let operator = self.refresh_operator_name().await;
            info!(%operator, ?addresses, "connected after {}s", elapsed.as_secs());
            self.publish_state();

            return AttemptOutcome::Connected;
        }

        if elapsed >= self.timings.attempt_budget {
            self.abort_attempt().await;
            events::publish(&self.events, Event::ConnectTimeout);
            self.publish_state();

            return AttemptOutcome::TimedOut;
        }

        if !self.dialer.is_running() {
            self.abort_attempt().await;
            events::publish(&self.events, Event::DialerExited);
            self.publish_state();

            return AttemptOutcome::DialerExited;
        }

        AttemptOutcome::Pending
    }

    fn tick_sampler(&mut self, now: Instant) {
        if !self.sampling.poll_tick(now) {
            return;
        }

        let addresses = self.netif.addresses(&self.config.interface);
        let counters = addresses
            .qualifies(self.config.ip_version)
            .then(|| self.netif.counters(&self.config.interface))
            .flatten();

        if !self.sampler.tick(now, counters) {
            info!(
                usage = %self.sampler.stats().usage(),
                duration = %self.sampler.stats().duration(),
                "{} went away, session over",
                self.config.interface
            );
            self.sampling.cancel();

            // pppd may still be renegotiating, give it a fresh budget to come back
            if self.dialer.is_running() {
                info!("dialer still running, waiting for it to reconnect");
                self.arm_attempt(now);
            }
            self.publish_state();
        }
    }

    fn arm_attempt(&mut self, now: Instant) {
        let mut task = RepeatingTask::new(self.timings.attempt_period);
        task.start(now);
        self.attempt = Some(ConnectionAttempt { started: now, task });
    }

    async fn abort_attempt(&mut self) {
        self.attempt = None;
        self.dialer.terminate();
        self.reset_modem();
        chat_script::remove(&self.paths).await;
    }

    /// Queues a modem reset without waiting for it to go through.
    fn reset_modem(&self) {
        let modem = Arc::clone(&self.modem);
        tokio::spawn(async move {
            if let Err(e) = modem.reset().await {
                warn!(error = ?e, "modem reset failed");
            }
        });
    }

    /// Empty if the modem does not answer in time.
    async fn refresh_operator_name(&self) -> String {
        time::timeout(self.timings.modem_reply, self.modem.update_operator_name())
            .await
            .unwrap_or_else(|_| {
                debug!("modem busy, operator name unknown");
                String::new()
            })
    }

    fn publish_state(&mut self) {
        let state = self.connection_state();
        if state == self.published {
            return;
        }

        self.published = state;
        events::publish(&self.events, Event::StateChanged(state));
    }
}
