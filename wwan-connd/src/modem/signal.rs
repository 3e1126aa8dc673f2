use derive_more::Display;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static CSQ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+CSQ:\s*(\d+),").expect("hardcoded regex is valid")
});

/// Coarse signal bucket derived from the `AT+CSQ` RSSI index.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SignalLevel {
    None,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SignalLevel {
    /// Maps the 0..=31 RSSI index reported by `AT+CSQ`. Anything outside that range,
    /// including 99 (unknown), is `None`.
    pub fn from_rssi(rssi: u32) -> Self {
        match rssi {
            0..=2 => SignalLevel::None,
            3..=10 => SignalLevel::Poor,
            11..=15 => SignalLevel::Fair,
            16..=25 => SignalLevel::Good,
            26..=31 => SignalLevel::Excellent,
            _ => SignalLevel::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalSample {
    pub rssi: u32,
    pub level: SignalLevel,
}

impl SignalSample {
    pub fn from_rssi(rssi: u32) -> Self {
        Self {
            rssi,
            level: SignalLevel::from_rssi(rssi),
        }
    }
}

/// Extracts the RSSI index out of a (cleaned) `AT+CSQ` response.
pub fn parse_csq(response: &str) -> Option<SignalSample> {
    let rssi = CSQ.captures(response)?.get(1)?.as_str().parse().ok()?;

    Some(SignalSample::from_rssi(rssi))
}
