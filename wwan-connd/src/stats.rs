//! Session traffic figures, sampled from the PPP interface's byte counters.

use crate::netif::NetStats;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatistics {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// bytes/s over the last sample interval
    pub rx_rate: f64,
    pub tx_rate: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub started: Option<Instant>,
    pub elapsed: Duration,
}

impl SessionStatistics {
    /// e.g. `1.20 MB received, 340 B sent`
    pub fn usage(&self) -> String {
        format!(
            "{} received, {} sent",
            format_bytes(self.rx_bytes),
            format_bytes(self.tx_bytes)
        )
    }

    /// e.g. `↓ 16.0 kbps ↑ 1.20 Mbps`
    pub fn throughput(&self) -> String {
        format!(
            "↓ {} ↑ {}",
            format_throughput(self.rx_rate),
            format_throughput(self.tx_rate)
        )
    }

    pub fn duration(&self) -> String {
        format_duration(self.elapsed)
    }
}

#[derive(Debug, Default)]
pub struct StatisticsSampler {
    stats: SessionStatistics,
    last: Option<(Instant, NetStats)>,
    running: bool,
}

impl StatisticsSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes everything and starts a new session at `now`.
    pub fn start(&mut self, now: Instant) {
        self.stats = SessionStatistics {
            started_at: Some(Utc::now()),
            started: Some(now),
            ..Default::default()
        };
        self.last = None;
        self.running = true;
    }

    /// Freezes the figures.
    pub fn stop(&mut self) {
        self.running = false;
        self.stats.rx_rate = 0.0;
        self.stats.tx_rate = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> &SessionStatistics {
        &self.stats
    }

    /// Feeds one counter reading. `None` means the interface is gone, which stops the
    /// sampler. Returns whether the sampler is still running.
    pub fn tick(&mut self, now: Instant, counters: Option<NetStats>) -> bool {
        if !self.running {
            return false;
        }

        let Some(counters) = counters else {
            self.stop();
            return false;
        };

        if let Some(started) = self.stats.started {
            self.stats.elapsed = now.saturating_duration_since(started);
        }

        if let Some((then, prev)) = self.last {
            let secs = now.saturating_duration_since(then).as_secs_f64();

            let (rx_delta, rx_rate) = delta(prev.rx_bytes, counters.rx_bytes, secs);
            let (tx_delta, tx_rate) = delta(prev.tx_bytes, counters.tx_bytes, secs);

            self.stats.rx_bytes += rx_delta;
            self.stats.tx_bytes += tx_delta;
            self.stats.rx_rate = rx_rate;
            self.stats.tx_rate = tx_rate;
        }

        self.last = Some((now, counters));

        true
    }
}

// A counter that went backwards (interface recreated, wrap) contributes nothing and
// becomes the new baseline.
fn delta(prev: u64, current: u64, secs: f64) -> (u64, f64) {
    match current.checked_sub(prev) {
        Some(d) if secs > 0.0 => (d, d as f64 / secs),
        Some(d) => (d, 0.0),
        None => (0, 0.0),
    }
}

/// Decimal units, `B` to `GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1000 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }

    format!("{value:.2} {unit}")
}

/// `bytes_per_sec` rendered as bits, `kbps` below 1000 kbps, `Mbps` above.
pub fn format_throughput(bytes_per_sec: f64) -> String {
    let kbps = bytes_per_sec.max(0.0) * 8.0 / 1000.0;

    if kbps < 1000.0 {
        format!("{kbps:.1} kbps")
    } else {
        format!("{:.2} Mbps", kbps / 1000.0)
    }
}

/// `HH:MM:SS`, hours keep counting past 24.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();

    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}
