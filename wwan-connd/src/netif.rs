use crate::config::IpVersion;
use nix::ifaddrs::getifaddrs;
use serde::Serialize;
use std::{
    fs, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6},
    path::{Path, PathBuf},
};
use tracing::warn;

/// Addresses currently bound to one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceAddresses {
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

impl InterfaceAddresses {
    /// A non-unspecified IPv4 address always counts. IPv6 only counts when the
    /// session is IPv6 only, and link-local ones never do.
    pub fn qualifies(&self, ip_version: IpVersion) -> bool {
        let v4 = self.ipv4.iter().any(|ip| !ip.is_unspecified());
        let v6 = ip_version == IpVersion::IPv6
            && self
                .ipv6
                .iter()
                .any(|ip| !ip.is_unspecified() && !ip.is_unicast_link_local());

        v4 || v6
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct NetStats {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl NetStats {
    /// Reads `<sysfs>/class/net/<iface>/statistics/{tx,rx}_bytes`.
    pub fn collect(sysfs: impl AsRef<Path>, iface: &str) -> io::Result<Self> {
        let stats = sysfs
            .as_ref()
            .join("class")
            .join("net")
            .join(iface)
            .join("statistics");

        let read = |name: &str| -> io::Result<u64> {
            fs::read_to_string(stats.join(name))?
                .trim()
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };

        Ok(Self {
            tx_bytes: read("tx_bytes")?,
            rx_bytes: read("rx_bytes")?,
        })
    }
}

/// OS view of network interfaces.
pub trait InterfaceTable: Send + Sync + 'static {
    fn addresses(&self, iface: &str) -> InterfaceAddresses;

    /// `None` when the interface does not exist.
    fn counters(&self, iface: &str) -> Option<NetStats>;
}

#[derive(Debug, Clone)]
pub struct SysInterfaceTable {
    sysfs: PathBuf,
}

impl SysInterfaceTable {
    pub fn new(sysfs: impl AsRef<Path>) -> Self {
        Self {
            sysfs: sysfs.as_ref().to_path_buf(),
        }
    }
}

impl InterfaceTable for SysInterfaceTable {
    fn addresses(&self, iface: &str) -> InterfaceAddresses {
        let mut found = InterfaceAddresses::default();

        let addrs = match getifaddrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(error = ?e, "getifaddrs failed");
                return found;
            }
        };

        for ifaddr in addrs.filter(|a| a.interface_name == iface) {
            let Some(addr) = ifaddr.address else {
                continue;
            };

            if let Some(sin) = addr.as_sockaddr_in() {
                found.ipv4.push(*SocketAddrV4::from(*sin).ip());
            } else if let Some(sin6) = addr.as_sockaddr_in6() {
                found.ipv6.push(*SocketAddrV6::from(*sin6).ip());
            }
        }

        found
    }

    fn counters(&self, iface: &str) -> Option<NetStats> {
        NetStats::collect(&self.sysfs, iface).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_sysfs_counters() {
        let sysfs = tempfile::tempdir().unwrap();
        let stats = sysfs.path().join("class/net/ppp0/statistics");
        fs::create_dir_all(&stats).unwrap();
        fs::write(stats.join("tx_bytes"), "500\n").unwrap();
        fs::write(stats.join("rx_bytes"), "1000\n").unwrap();

        let table = SysInterfaceTable::new(sysfs.path());

        assert_eq!(
            table.counters("ppp0"),
            Some(NetStats {
                tx_bytes: 500,
                rx_bytes: 1000
            })
        );
        assert_eq!(table.counters("ppp1"), None);
    }

    #[test]
    fn garbage_counters_are_missing() {
        let sysfs = tempfile::tempdir().unwrap();
        let stats = sysfs.path().join("class/net/ppp0/statistics");
        fs::create_dir_all(&stats).unwrap();
        fs::write(stats.join("tx_bytes"), "lots").unwrap();
        fs::write(stats.join("rx_bytes"), "1").unwrap();

        assert!(NetStats::collect(sysfs.path(), "ppp0").is_err());
    }

    #[test]
    fn unknown_interface_has_no_addresses() {
        let table = SysInterfaceTable::new("/sys");

        assert_eq!(
            table.addresses("definitely-not-an-iface"),
            InterfaceAddresses::default()
        );
    }

    #[test]
    fn unspecified_does_not_qualify() {
        let addrs = InterfaceAddresses {
            ipv4: vec![Ipv4Addr::UNSPECIFIED],
            ipv6: vec![Ipv6Addr::UNSPECIFIED],
        };

        assert!(!addrs.qualifies(IpVersion::IPv4));
        assert!(!addrs.qualifies(IpVersion::IPv6));
    }

    #[test]
    fn link_local_ipv6_does_not_qualify() {
        let mut addrs = InterfaceAddresses {
            ipv4: Vec::new(),
            ipv6: vec!["fe80::1c2d:3e4f:5a6b:7c8d".parse().unwrap()],
        };

        assert!(!addrs.qualifies(IpVersion::IPv6));

        addrs.ipv6.push("2a02:3038:40b:1::1".parse().unwrap());
        assert!(addrs.qualifies(IpVersion::IPv6));
        assert!(!addrs.qualifies(IpVersion::IPv4));
    }
}
