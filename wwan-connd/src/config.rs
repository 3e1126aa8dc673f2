use derive_more::Display;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, net::Ipv4Addr, path::PathBuf, str::FromStr};

/// Everything needed to dial a PPP session over the modem.
#[derive(Clone)]
pub struct DialConfig {
    pub at_port: PathBuf,
    pub ppp_port: PathBuf,
    pub apn: String,
    pub pin: String,
    pub baud: u32,
    pub operator: OperatorSelector,
    pub ip_version: IpVersion,
    pub dns: DnsPolicy,
    /// Piped to `sudo -S`, never rendered anywhere else.
    pub credential: Option<SecretString>,
    pub interface: String,
    pub script_dir: PathBuf,
    pub timeout_policy: ConnectTimeoutPolicy,
}

impl DialConfig {
    pub const DEFAULT_AT_PORT: &str = "/dev/ttyUSB2";
    pub const DEFAULT_PPP_PORT: &str = "/dev/ttyUSB3";
    pub const DEFAULT_APN: &str = "internet";
    pub const DEFAULT_BAUD: u32 = 460_800;
    pub const DEFAULT_INTERFACE: &str = "ppp0";
    pub const DEFAULT_SCRIPT_DIR: &str = "/tmp";
}

const SHELL_SPECIAL: &str = "\"'`$\\;&|<>()*?![]{}~#";

/// A dial setting that cannot be rendered into the scripts safely.
#[derive(Debug, thiserror::Error)]
pub enum InvalidDialConfig {
    #[error("{field} contains characters the chat script cannot carry")]
    Unquotable { field: &'static str },
    #[error("script dir {} must not contain whitespace or shell metacharacters", .0.display())]
    ScriptDir(PathBuf),
}

impl DialConfig {
    /// Checks that everything pasted into the chat script and the `pppd` command
    /// line stays a single token there.
    pub fn validate(&self) -> Result<(), InvalidDialConfig> {
        let operator = match &self.operator {
            OperatorSelector::Auto => "",
            OperatorSelector::Numeric(id) => id.as_str(),
        };

        for (field, value) in [
            ("apn", self.apn.as_str()),
            ("pin", self.pin.as_str()),
            ("operator", operator),
        ] {
            if value
                .chars()
                .any(|c| matches!(c, '"' | '\'' | '\\') || c.is_control())
            {
                return Err(InvalidDialConfig::Unquotable { field });
            }
        }

        // pppd hands its `connect` option to /bin/sh
        let script_dir = self.script_dir.to_string_lossy();
        if script_dir.chars().any(|c| {
            c.is_whitespace() || c.is_control() || SHELL_SPECIAL.contains(c)
        }) {
            return Err(InvalidDialConfig::ScriptDir(self.script_dir.clone()));
        }

        Ok(())
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            at_port: Self::DEFAULT_AT_PORT.into(),
            ppp_port: Self::DEFAULT_PPP_PORT.into(),
            apn: Self::DEFAULT_APN.into(),
            pin: String::new(),
            baud: Self::DEFAULT_BAUD,
            operator: OperatorSelector::Auto,
            ip_version: IpVersion::IPv4,
            dns: DnsPolicy::Peer,
            credential: None,
            interface: Self::DEFAULT_INTERFACE.into(),
            script_dir: Self::DEFAULT_SCRIPT_DIR.into(),
            timeout_policy: ConnectTimeoutPolicy::Abort,
        }
    }
}

impl fmt::Debug for DialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialConfig")
            .field("at_port", &self.at_port)
            .field("ppp_port", &self.ppp_port)
            .field("apn", &self.apn)
            .field("pin", &if self.pin.is_empty() { "" } else { "****" })
            .field("baud", &self.baud)
            .field("operator", &self.operator)
            .field("ip_version", &self.ip_version)
            .field("dns", &self.dns)
            .field("credential", &self.credential)
            .field("interface", &self.interface)
            .field("script_dir", &self.script_dir)
            .field("timeout_policy", &self.timeout_policy)
            .finish()
    }
}

/// Which network the modem registers on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Display)]
pub enum OperatorSelector {
    #[default]
    #[display("auto")]
    Auto,
    /// Numeric MCC/MNC, e.g. `26201`.
    #[display("{_0}")]
    Numeric(String),
}

impl FromStr for OperatorSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "0" || s.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Numeric(s.to_owned()))
        }
    }
}

impl<'de> Deserialize<'de> for OperatorSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient_string(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

impl Serialize for OperatorSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    #[serde(alias = "IP", alias = "ip", alias = "IPv4")]
    #[value(name = "ipv4", alias = "ip")]
    IPv4,
    #[serde(alias = "IPV6", alias = "IPv6")]
    #[value(name = "ipv6")]
    IPv6,
    #[serde(alias = "IPV4V6", alias = "IPv4v6")]
    #[value(name = "ipv4v6")]
    IPv4v6,
}

impl IpVersion {
    /// PDP type as used in `AT+CGDCONT`.
    pub fn pdp_type(self) -> &'static str {
        match self {
            IpVersion::IPv4 => "IP",
            IpVersion::IPv6 => "IPV6",
            IpVersion::IPv4v6 => "IPV4V6",
        }
    }

    pub fn wants_ipv6(self) -> bool {
        matches!(self, IpVersion::IPv6 | IpVersion::IPv4v6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsPolicy {
    /// Use the servers the peer hands out during IPCP.
    Peer,
    Explicit {
        primary: Ipv4Addr,
        secondary: Ipv4Addr,
    },
}

impl DnsPolicy {
    pub const DEFAULT_PRIMARY: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
    pub const DEFAULT_SECONDARY: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

    pub fn explicit(primary: Option<Ipv4Addr>, secondary: Option<Ipv4Addr>) -> Self {
        Self::Explicit {
            primary: primary.unwrap_or(Self::DEFAULT_PRIMARY),
            secondary: secondary.unwrap_or(Self::DEFAULT_SECONDARY),
        }
    }
}

/// What happens once a connection attempt exceeded its budget.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ConnectTimeoutPolicy {
    /// Clean up and report `ConnectTimeout`.
    #[default]
    Abort,
    /// Clean up, report, then terminate the daemon with an error.
    Exit,
}

/// Accepts strings as well as bare numbers, since env providers turn `1234` into an
/// integer before we ever see it.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
    })
}

/// Like [`lenient_string`], an empty value counts as absent.
pub(crate) fn lenient_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    let raw = lenient_string(deserializer)?;

    Ok((!raw.is_empty()).then(|| SecretString::new(raw)))
}
