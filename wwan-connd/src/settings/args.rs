use crate::config::{ConnectTimeoutPolicy, IpVersion, OperatorSelector};
use clap::Parser;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Keeps a cellular modem online over PPP and exposes it on the session bus.
///
/// The SIM PIN and the sudo password are only read from the config file or the
/// environment, never from the command line.
#[derive(Debug, Parser, Serialize)]
#[command(author, version, about)]
pub struct Args {
    /// The path to the config file.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Serial device taking AT commands.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_port: Option<String>,
    /// Serial device handed to pppd.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ppp_port: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apn: Option<String>,
    /// `auto` or a numeric MCC/MNC.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<OperatorSelector>,
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_version: Option<IpVersion>,
    /// Use the DNS servers announced by the network.
    #[arg(long)]
    #[serde(
        rename = "use_peer_dns",
        skip_serializing_if = "Option::is_none"
    )]
    pub peer_dns: Option<bool>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_primary: Option<Ipv4Addr>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_secondary: Option<Ipv4Addr>,
    /// The PPP interface pppd brings up.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Where the chat script and the pppd wrapper are written.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<String>,
    /// Milliseconds a connection attempt may take.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_policy: Option<ConnectTimeoutPolicy>,
}
