//! Linux-specific readings from procfs and sysfs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use procfs::Current;
use tracing::{debug, warn};

use super::io::DiskIoReading;
use super::Capacity;
use crate::registry::Named;

const SECTOR_SIZE: u64 = 512;

/// Byte counters of whole disks from `/proc/diskstats`.
pub(super) fn disk_io() -> BTreeMap<String, DiskIoReading> {
    let Ok(diskstats) = procfs::diskstats() else {
        warn!("Failed to read /proc/diskstats");
        return BTreeMap::new();
    };

    diskstats
        .into_iter()
        .filter(|disk| is_whole_disk(&disk.name))
        .map(|disk| {
            let reading = DiskIoReading {
                read_bytes: disk.sectors_read * SECTOR_SIZE,
                written_bytes: disk.sectors_written * SECTOR_SIZE,
            };
            (disk.name, reading)
        })
        .collect()
}

fn is_whole_disk(name: &str) -> bool {
    if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("zram") {
        return false;
    }
    // Partitions only appear below their parent in /sys/block
    Path::new("/sys/block").join(name).exists()
}

/// Commit limit and charge from `/proc/meminfo`.
pub(super) fn committed_memory() -> Option<Capacity> {
    let meminfo = match procfs::Meminfo::current() {
        Ok(meminfo) => meminfo,
        Err(e) => {
            debug!("Failed to read /proc/meminfo: {}", e);
            return None;
        }
    };
    let limit = meminfo.commit_limit?;
    Some(Capacity::new(
        limit.saturating_sub(meminfo.committed_as),
        limit,
    ))
}

/// Physical memory by use, from `/proc/meminfo` and the online memory blocks.
pub(super) fn memory_breakdown() -> Vec<Named<u64>> {
    match procfs::Meminfo::current() {
        Ok(meminfo) => breakdown(&meminfo, installed_memory()),
        Err(e) => {
            debug!("Failed to read /proc/meminfo: {}", e);
            Vec::new()
        }
    }
}

fn breakdown(meminfo: &procfs::Meminfo, installed: Option<u64>) -> Vec<Named<u64>> {
    let kinds = [
        ("hardware", installed.map(|bytes| bytes.saturating_sub(meminfo.mem_total))),
        (
            "kernel",
            Some(
                meminfo.slab
                    + meminfo.kernel_stack.unwrap_or(0)
                    + meminfo.page_tables.unwrap_or(0),
            ),
        ),
        ("cache", Some(meminfo.cached + meminfo.buffers)),
        ("shared", meminfo.shmem),
        ("application", meminfo.anon_pages),
        ("modified", Some(meminfo.dirty + meminfo.writeback)),
        ("standby", meminfo.inactive_file),
        ("free", Some(meminfo.mem_free)),
    ];

    kinds
        .into_iter()
        .filter_map(|(kind, bytes)| Some(Named::new(kind, bytes?)))
        .collect()
}

/// Installed RAM as the sum of online memory blocks, when the kernel exposes them.
fn installed_memory() -> Option<u64> {
    let root = Path::new("/sys/devices/system/memory");
    let raw = fs::read_to_string(root.join("block_size_bytes")).ok()?;
    let block_size = parse_block_size(&raw)?;

    let online = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("memory"))
        .filter(|entry| {
            fs::read_to_string(entry.path().join("online")).is_ok_and(|state| state.trim() == "1")
        })
        .count() as u64;

    (online > 0).then(|| online * block_size)
}

/// `block_size_bytes` is hexadecimal without a prefix.
fn parse_block_size(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim(), 16).ok().filter(|size| *size > 0)
}

/// Rated maximum frequency of the first core in kHz.
pub(super) fn max_frequency_khz() -> Option<u64> {
    let raw = fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq").ok()?;
    raw.trim().parse().ok().filter(|khz| *khz > 0)
}

/// Link speed in bytes per second from `/sys/class/net/<adapter>/speed`.
pub(super) fn link_speed(adapter: &str) -> Option<f64> {
    let raw = fs::read_to_string(Path::new("/sys/class/net").join(adapter).join("speed")).ok()?;
    parse_link_speed(&raw)
}

/// The kernel reports Mb/s, and -1 while the link is down.
fn parse_link_speed(raw: &str) -> Option<f64> {
    let mbps: i64 = raw.trim().parse().ok()?;
    (mbps > 0).then(|| mbps as f64 * 1_000_000.0 / 8.0)
}

/// Charge of the first battery in `/sys/class/power_supply`.
pub(super) fn battery_level() -> Option<f64> {
    let entries = fs::read_dir("/sys/class/power_supply").ok()?;
    let mut batteries: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("BAT"))
        })
        .collect();
    batteries.sort();

    let raw = fs::read_to_string(batteries.first()?.join("capacity")).ok()?;
    raw.trim().parse().ok()
}
