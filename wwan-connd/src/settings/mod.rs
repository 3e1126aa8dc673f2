use crate::{
    config::{
        self, ConnectTimeoutPolicy, DialConfig, DnsPolicy, InvalidDialConfig, IpVersion,
        OperatorSelector,
    },
    controller::Timings,
};
use figment::providers::Format as _;
use secrecy::SecretString;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use std::{
    net::Ipv4Addr,
    path::{Path, PathBuf},
    time::Duration,
};

mod args;
pub use args::Args;

#[cfg(test)]
mod tests;

/// `Settings` are the configurable options of the daemon.
///
/// The only entry point to construct `Settings` is `Settings::get`. Anything not
/// set anywhere falls back to [`Settings::default`].
#[serde_as]
#[derive(Deserialize)]
#[serde(default)]
pub struct Settings {
    pub at_port: PathBuf,
    pub ppp_port: PathBuf,
    pub baud: u32,
    #[serde(deserialize_with = "config::lenient_string")]
    pub apn: String,
    /// Empty when the SIM has no PIN.
    #[serde(deserialize_with = "config::lenient_string")]
    pub pin: String,
    pub operator: OperatorSelector,
    pub ip_version: IpVersion,
    pub use_peer_dns: bool,
    /// Only used when `use_peer_dns` is off.
    pub dns_primary: Option<Ipv4Addr>,
    pub dns_secondary: Option<Ipv4Addr>,
    pub interface: String,
    pub script_dir: PathBuf,
    #[serde_as(as = "DurationMilliSeconds")]
    pub connect_timeout: Duration,
    pub connect_timeout_policy: ConnectTimeoutPolicy,
    #[serde(deserialize_with = "config::lenient_secret")]
    pub sudo_password: Option<SecretString>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            at_port: DialConfig::DEFAULT_AT_PORT.into(),
            ppp_port: DialConfig::DEFAULT_PPP_PORT.into(),
            baud: DialConfig::DEFAULT_BAUD,
            apn: DialConfig::DEFAULT_APN.into(),
            pin: String::new(),
            operator: OperatorSelector::Auto,
            ip_version: IpVersion::IPv4,
            use_peer_dns: true,
            dns_primary: None,
            dns_secondary: None,
            interface: DialConfig::DEFAULT_INTERFACE.into(),
            script_dir: DialConfig::DEFAULT_SCRIPT_DIR.into(),
            connect_timeout: Timings::DEFAULT_ATTEMPT_BUDGET,
            connect_timeout_policy: ConnectTimeoutPolicy::Abort,
            sudo_password: None,
        }
    }
}

impl Settings {
    /// Constructs `Settings` from a config file, environment variables, and command line
    /// arguments. Command line arguments always take precedence over environment variables, which
    /// in turn take precedence over the config file.
    pub fn get<P: AsRef<Path>>(
        args: &Args,
        config: P,
        env_prefix: &str,
    ) -> figment::error::Result<Settings> {
        figment::Figment::new()
            .merge(figment::providers::Toml::file(config))
            .merge(figment::providers::Env::prefixed(env_prefix))
            .merge(figment::providers::Serialized::defaults(args))
            .extract()
    }

    /// Fails on values that cannot be rendered into the dial scripts.
    pub fn dial_config(&self) -> Result<DialConfig, InvalidDialConfig> {
        let dns = if self.use_peer_dns {
            DnsPolicy::Peer
        } else {
            DnsPolicy::explicit(self.dns_primary, self.dns_secondary)
        };

        let config = DialConfig {
            at_port: self.at_port.clone(),
            ppp_port: self.ppp_port.clone(),
            apn: self.apn.clone(),
            pin: self.pin.clone(),
            baud: self.baud,
            operator: self.operator.clone(),
            ip_version: self.ip_version,
            dns,
            credential: self.sudo_password.clone(),
            interface: self.interface.clone(),
            script_dir: self.script_dir.clone(),
            timeout_policy: self.connect_timeout_policy,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn timings(&self) -> Timings {
        Timings {
            attempt_budget: self.connect_timeout,
            ..Timings::default()
        }
    }
}
