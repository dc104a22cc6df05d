//! System metrics collection
//!
//! Provides cross-platform readings for the system agent:
//! - CPU usage
//! - Memory, swap and commit charge, plus where physical memory goes
//! - Processor performance against its rated maximum frequency
//! - Capacity of local fixed volumes
//! - Cumulative disk and network byte counters (rates live in [`io`])
//! - Boot time and battery level

pub mod io;
#[cfg(target_os = "linux")]
mod linux;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use sysinfo::{Disks, Networks, System};

use crate::registry::{Aggregate, Named};
use io::{DiskIoReading, NetworkIoReading};

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// File systems that never count as a local fixed volume.
const PSEUDO_FILE_SYSTEMS: &[&str] = &[
    "tmpfs", "devtmpfs", "overlay", "squashfs", "proc", "sysfs", "efivarfs", "ramfs",
];

/// Free and total bytes of one memory pool or volume.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Capacity {
    pub free_bytes: f64,
    pub total_bytes: f64,
}

impl Capacity {
    pub fn new(free_bytes: u64, total_bytes: u64) -> Self {
        Self {
            free_bytes: free_bytes as f64,
            total_bytes: total_bytes as f64,
        }
    }

    pub fn used_bytes(&self) -> f64 {
        self.total_bytes - self.free_bytes
    }

    /// `None` for an empty pool.
    pub fn used_percent(&self) -> Option<f64> {
        (self.total_bytes > 0.0).then(|| 100.0 * self.used_bytes() / self.total_bytes)
    }

    pub fn total_mib(&self) -> f64 {
        self.total_bytes / MIB
    }

    pub fn free_mib(&self) -> f64 {
        self.free_bytes / MIB
    }

    pub fn used_mib(&self) -> f64 {
        self.used_bytes() / MIB
    }

    pub fn total_gib(&self) -> f64 {
        self.total_bytes / GIB
    }

    pub fn free_gib(&self) -> f64 {
        self.free_bytes / GIB
    }

    pub fn used_gib(&self) -> f64 {
        self.used_bytes() / GIB
    }
}

pub fn to_mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

impl Aggregate for Capacity {
    fn zero() -> Self {
        Self::default()
    }

    fn combine(&self, other: &Self) -> Self {
        Self {
            free_bytes: self.free_bytes + other.free_bytes,
            total_bytes: self.total_bytes + other.total_bytes,
        }
    }
}

/// Source of the readings the system agent publishes.
///
/// Each call refreshes whatever it needs. `None` or an empty collection means
/// the metric is unavailable on this host and its sensors are skipped.
pub trait MetricsProvider: Send {
    /// Global CPU usage in percent since the previous call.
    fn cpu_usage(&mut self) -> Option<f64>;

    /// `Memory`, `Swap` and `Committed` pools, in that order, when known.
    fn memory(&mut self) -> Vec<Named<Capacity>>;

    /// Physical memory in bytes by use (`kernel`, `cache`, `free` ...).
    /// Kinds the host cannot tell apart are left out.
    fn memory_breakdown(&mut self) -> Vec<Named<u64>>;

    /// Current processor frequency as a percentage of its rated maximum.
    fn processor_performance(&mut self) -> Option<f64>;

    /// Local fixed volumes keyed by display label, without the total.
    fn volumes(&mut self) -> Vec<Named<Capacity>>;

    /// Cumulative byte counters of whole disks.
    fn disk_io(&mut self) -> BTreeMap<String, DiskIoReading>;

    /// Cumulative byte counters of network adapters.
    fn network_io(&mut self) -> BTreeMap<String, NetworkIoReading>;

    fn last_boot(&mut self) -> Option<DateTime<Utc>>;

    /// Battery charge in percent, `None` without a battery.
    fn battery_level(&mut self) -> Option<f64>;
}

/// [`MetricsProvider`] backed by `sysinfo`, plus `procfs` and `/sys` on Linux.
pub struct SysinfoProvider {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        // First CPU sample is a baseline
        system.refresh_cpu_usage();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoProvider {
    fn cpu_usage(&mut self) -> Option<f64> {
        self.system.refresh_cpu_usage();
        let usage = self.system.global_cpu_info().cpu_usage();
        usage.is_finite().then_some(f64::from(usage))
    }

    fn memory(&mut self) -> Vec<Named<Capacity>> {
        self.system.refresh_memory();

        let mut pools = vec![
            Named::new(
                "Memory",
                Capacity::new(self.system.available_memory(), self.system.total_memory()),
            ),
            Named::new(
                "Swap",
                Capacity::new(self.system.free_swap(), self.system.total_swap()),
            ),
        ];
        if let Some(committed) = committed_memory() {
            pools.push(Named::new("Committed", committed));
        }
        pools
    }

    fn memory_breakdown(&mut self) -> Vec<Named<u64>> {
        #[cfg(target_os = "linux")]
        {
            linux::memory_breakdown()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Vec::new()
        }
    }

    fn processor_performance(&mut self) -> Option<f64> {
        self.system.refresh_cpu_frequency();
        let current: Vec<u64> = self.system.cpus().iter().map(|cpu| cpu.frequency()).collect();
        performance_percent(&current, max_frequency_khz()?)
    }

    fn volumes(&mut self) -> Vec<Named<Capacity>> {
        self.disks.refresh_list();

        let mut volumes: Vec<Named<Capacity>> = Vec::new();
        for disk in self.disks.list() {
            let file_system = disk.file_system().to_string_lossy();
            if disk.is_removable() || PSEUDO_FILE_SYSTEMS.contains(&file_system.as_ref()) {
                continue;
            }
            let label = volume_label(disk.mount_point());
            if volumes.iter().any(|volume| volume.name == label) {
                continue;
            }
            volumes.push(Named::new(
                label,
                Capacity::new(disk.available_space(), disk.total_space()),
            ));
        }
        volumes
    }

    fn disk_io(&mut self) -> BTreeMap<String, DiskIoReading> {
        #[cfg(target_os = "linux")]
        {
            linux::disk_io()
        }
        #[cfg(not(target_os = "linux"))]
        {
            BTreeMap::new()
        }
    }

    fn network_io(&mut self) -> BTreeMap<String, NetworkIoReading> {
        self.networks.refresh_list();

        self.networks
            .list()
            .iter()
            .filter(|(name, _)| !is_loopback_adapter(name))
            .map(|(name, data)| {
                let reading = NetworkIoReading {
                    received_bytes: data.total_received(),
                    sent_bytes: data.total_transmitted(),
                    link_bytes_per_sec: link_speed(name),
                };
                (name.clone(), reading)
            })
            .collect()
    }

    fn last_boot(&mut self) -> Option<DateTime<Utc>> {
        let boot = i64::try_from(System::boot_time()).ok()?;
        DateTime::from_timestamp(boot, 0)
    }

    fn battery_level(&mut self) -> Option<f64> {
        #[cfg(target_os = "linux")]
        {
            linux::battery_level()
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

fn committed_memory() -> Option<Capacity> {
    #[cfg(target_os = "linux")]
    {
        linux::committed_memory()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn max_frequency_khz() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        linux::max_frequency_khz()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Mean of per-core frequencies in MHz against the rated maximum in kHz.
fn performance_percent(current_mhz: &[u64], max_khz: u64) -> Option<f64> {
    let running: Vec<u64> = current_mhz.iter().copied().filter(|mhz| *mhz > 0).collect();
    if running.is_empty() || max_khz == 0 {
        return None;
    }
    let mean_khz = running.iter().sum::<u64>() as f64 * 1000.0 / running.len() as f64;
    Some(100.0 * mean_khz / max_khz as f64)
}

fn link_speed(_adapter: &str) -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        linux::link_speed(_adapter)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn is_loopback_adapter(name: &str) -> bool {
    name == "lo" || name.starts_with("Loopback")
}

/// Display label of a mount point: the drive letter on Windows, `root` for
/// `/`, otherwise the path without its leading slash.
pub fn volume_label(mount_point: &Path) -> String {
    let path = mount_point.to_string_lossy();
    if cfg!(windows) {
        return path.trim_end_matches('\\').to_string();
    }
    match path.trim_start_matches('/') {
        "" => "root".to_string(),
        rest => rest.to_string(),
    }
}

/// OS vendor shown as the device manufacturer.
pub fn os_manufacturer() -> Option<String> {
    System::name()
}

/// OS release shown as the device model.
pub fn os_model() -> Option<String> {
    System::long_os_version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::aggregate;

    #[test]
    fn test_capacity_units() {
        let capacity = Capacity::new(1024 * 1024 * 1024, 4 * 1024 * 1024 * 1024);
        assert_eq!(capacity.total_gib(), 4.0);
        assert_eq!(capacity.free_gib(), 1.0);
        assert_eq!(capacity.used_gib(), 3.0);
        assert_eq!(capacity.used_mib(), 3072.0);
        assert_eq!(capacity.used_percent(), Some(75.0));
    }

    #[test]
    fn test_empty_pool_has_no_percent() {
        assert_eq!(Capacity::new(0, 0).used_percent(), None);
    }

    #[test]
    fn test_capacity_total() {
        let volumes = [Capacity::new(10, 100), Capacity::new(30, 100)];
        let total = aggregate(&volumes);
        assert_eq!(total, Capacity::new(40, 200));
        assert_eq!(total.used_percent(), Some(80.0));
    }

    #[cfg(unix)]
    #[test]
    fn test_volume_label() {
        assert_eq!(volume_label(Path::new("/")), "root");
        assert_eq!(volume_label(Path::new("/home")), "home");
        assert_eq!(volume_label(Path::new("/mnt/data")), "mnt/data");
    }

    #[test]
    fn test_performance_percent() {
        assert_eq!(performance_percent(&[1800, 3600], 3_600_000), Some(75.0));
        // Offline cores report 0 MHz
        assert_eq!(performance_percent(&[2400, 0], 4_800_000), Some(50.0));
        assert_eq!(performance_percent(&[0, 0], 4_800_000), None);
        assert_eq!(performance_percent(&[2400], 0), None);
        assert_eq!(performance_percent(&[], 4_800_000), None);
    }

    #[test]
    fn test_to_mib() {
        assert_eq!(to_mib(3 * 1024 * 1024), 3.0);
    }

    #[test]
    fn test_loopback_adapter_skipped() {
        assert!(is_loopback_adapter("lo"));
        assert!(!is_loopback_adapter("eth0"));
    }

    #[test]
    fn test_sysinfo_provider_reports_memory() {
        let mut provider = SysinfoProvider::new();
        let memory = provider.memory();
        assert_eq!(memory[0].name, "Memory");
        assert!(memory[0].value.total_bytes > 0.0);
        assert!(provider.last_boot().is_some());
    }
}
