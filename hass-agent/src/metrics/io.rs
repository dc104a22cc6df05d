//! Disk and network throughput counters
//!
//! The provider hands out cumulative byte counters; these types turn two
//! consecutive readings into per-second rates and plug into
//! [`ResourceRegistry`](crate::registry::ResourceRegistry).

use std::time::Instant;

use crate::registry::{Aggregate, RateCounter};

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Cumulative bytes moved by one block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoReading {
    pub read_bytes: u64,
    pub written_bytes: u64,
}

/// Cumulative bytes moved by one network adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkIoReading {
    pub received_bytes: u64,
    pub sent_bytes: u64,
    /// Negotiated link speed in bytes per second, when known.
    pub link_bytes_per_sec: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskIoRate {
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

impl DiskIoRate {
    pub fn read_mib_per_sec(&self) -> f64 {
        self.read_bytes_per_sec / MIB
    }

    pub fn write_mib_per_sec(&self) -> f64 {
        self.write_bytes_per_sec / MIB
    }

    pub fn total_mib_per_sec(&self) -> f64 {
        (self.read_bytes_per_sec + self.write_bytes_per_sec) / MIB
    }
}

impl Aggregate for DiskIoRate {
    fn zero() -> Self {
        Self::default()
    }

    fn combine(&self, other: &Self) -> Self {
        Self {
            read_bytes_per_sec: self.read_bytes_per_sec + other.read_bytes_per_sec,
            write_bytes_per_sec: self.write_bytes_per_sec + other.write_bytes_per_sec,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkIoRate {
    pub received_bytes_per_sec: f64,
    pub sent_bytes_per_sec: f64,
    pub bandwidth_bytes_per_sec: f64,
}

impl NetworkIoRate {
    pub fn received_kib_per_sec(&self) -> f64 {
        self.received_bytes_per_sec / KIB
    }

    pub fn sent_kib_per_sec(&self) -> f64 {
        self.sent_bytes_per_sec / KIB
    }

    pub fn total_kib_per_sec(&self) -> f64 {
        (self.received_bytes_per_sec + self.sent_bytes_per_sec) / KIB
    }

    pub fn bandwidth_kib_per_sec(&self) -> f64 {
        self.bandwidth_bytes_per_sec / KIB
    }
}

impl Aggregate for NetworkIoRate {
    fn zero() -> Self {
        Self::default()
    }

    fn combine(&self, other: &Self) -> Self {
        Self {
            received_bytes_per_sec: self.received_bytes_per_sec + other.received_bytes_per_sec,
            sent_bytes_per_sec: self.sent_bytes_per_sec + other.sent_bytes_per_sec,
            bandwidth_bytes_per_sec: self.bandwidth_bytes_per_sec + other.bandwidth_bytes_per_sec,
        }
    }
}

/// Bytes per second between two cumulative readings. Counter resets yield 0.
fn per_second(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / elapsed_secs
}

pub struct DiskIoCounter {
    last: DiskIoReading,
    at: Instant,
}

impl RateCounter for DiskIoCounter {
    type Reading = DiskIoReading;
    type Rate = DiskIoRate;

    fn prime(reading: DiskIoReading, at: Instant) -> Self {
        Self { last: reading, at }
    }

    fn sample(&mut self, reading: DiskIoReading, at: Instant) -> DiskIoRate {
        let elapsed = at.saturating_duration_since(self.at).as_secs_f64();
        let rate = DiskIoRate {
            read_bytes_per_sec: per_second(self.last.read_bytes, reading.read_bytes, elapsed),
            write_bytes_per_sec: per_second(self.last.written_bytes, reading.written_bytes, elapsed),
        };
        self.last = reading;
        self.at = at;
        rate
    }
}

pub struct NetworkIoCounter {
    last: NetworkIoReading,
    at: Instant,
}

impl RateCounter for NetworkIoCounter {
    type Reading = NetworkIoReading;
    type Rate = NetworkIoRate;

    fn prime(reading: NetworkIoReading, at: Instant) -> Self {
        Self { last: reading, at }
    }

    fn sample(&mut self, reading: NetworkIoReading, at: Instant) -> NetworkIoRate {
        let elapsed = at.saturating_duration_since(self.at).as_secs_f64();
        let rate = NetworkIoRate {
            received_bytes_per_sec: per_second(self.last.received_bytes, reading.received_bytes, elapsed),
            sent_bytes_per_sec: per_second(self.last.sent_bytes, reading.sent_bytes, elapsed),
            bandwidth_bytes_per_sec: reading.link_bytes_per_sec.unwrap_or(0.0),
        };
        self.last = reading;
        self.at = at;
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::aggregate;
    use std::time::Duration;

    #[test]
    fn test_disk_rate_from_deltas() {
        let t0 = Instant::now();
        let mut counter = DiskIoCounter::prime(
            DiskIoReading {
                read_bytes: 0,
                written_bytes: 1024,
            },
            t0,
        );

        let rate = counter.sample(
            DiskIoReading {
                read_bytes: 2 * 1024 * 1024,
                written_bytes: 1024 + 4 * 1024 * 1024,
            },
            t0 + Duration::from_secs(2),
        );

        assert_eq!(rate.read_mib_per_sec(), 1.0);
        assert_eq!(rate.write_mib_per_sec(), 2.0);
        assert_eq!(rate.total_mib_per_sec(), 3.0);
    }

    #[test]
    fn test_counter_reset_reports_zero() {
        let t0 = Instant::now();
        let mut counter = DiskIoCounter::prime(
            DiskIoReading {
                read_bytes: 5000,
                written_bytes: 5000,
            },
            t0,
        );
        let rate = counter.sample(DiskIoReading::default(), t0 + Duration::from_secs(1));
        assert_eq!(rate, DiskIoRate::zero());
    }

    #[test]
    fn test_same_instant_is_zero() {
        let t0 = Instant::now();
        let mut counter = NetworkIoCounter::prime(NetworkIoReading::default(), t0);
        let rate = counter.sample(
            NetworkIoReading {
                received_bytes: 100,
                sent_bytes: 100,
                link_bytes_per_sec: None,
            },
            t0,
        );
        assert_eq!(rate.total_kib_per_sec(), 0.0);
    }

    #[test]
    fn test_network_rate_and_bandwidth() {
        let t0 = Instant::now();
        let mut counter = NetworkIoCounter::prime(NetworkIoReading::default(), t0);
        let rate = counter.sample(
            NetworkIoReading {
                received_bytes: 10 * 1024,
                sent_bytes: 5 * 1024,
                link_bytes_per_sec: Some(125_000_000.0),
            },
            t0 + Duration::from_secs(5),
        );

        assert_eq!(rate.received_kib_per_sec(), 2.0);
        assert_eq!(rate.sent_kib_per_sec(), 1.0);
        assert_eq!(rate.total_kib_per_sec(), 3.0);
        assert_eq!(rate.bandwidth_kib_per_sec(), 125_000_000.0 / 1024.0);
    }

    #[test]
    fn test_network_total_sums_bandwidth() {
        let rates = [
            NetworkIoRate {
                received_bytes_per_sec: 1024.0,
                sent_bytes_per_sec: 0.0,
                bandwidth_bytes_per_sec: 2048.0,
            },
            NetworkIoRate {
                received_bytes_per_sec: 0.0,
                sent_bytes_per_sec: 1024.0,
                bandwidth_bytes_per_sec: 2048.0,
            },
        ];
        let total = aggregate(&rates);
        assert_eq!(total.total_kib_per_sec(), 2.0);
        assert_eq!(total.bandwidth_kib_per_sec(), 4.0);
    }
}
