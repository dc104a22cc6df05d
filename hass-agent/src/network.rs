//! Network discovery for reachability probes
//!
//! This module handles:
//! - Host name detection (default node identity of the system agent)
//! - Internal targets: DNS servers, default gateways and DHCP servers
//! - External targets: a fixed list of public DNS resolvers

use std::collections::BTreeSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use tracing::debug;

/// Public resolvers probed for "Ping External".
const EXTERNAL_TARGETS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(1, 0, 0, 1),        // Cloudflare
    Ipv4Addr::new(1, 1, 1, 1),        // Cloudflare
    Ipv4Addr::new(208, 67, 220, 220), // OpenDNS
    Ipv4Addr::new(208, 67, 222, 222), // OpenDNS
    Ipv4Addr::new(64, 6, 64, 6),      // Verisign
    Ipv4Addr::new(64, 6, 65, 6),      // Verisign
    Ipv4Addr::new(8, 20, 247, 20),    // Comodo Secure DNS
    Ipv4Addr::new(8, 26, 56, 26),     // Comodo Secure DNS
    Ipv4Addr::new(8, 8, 4, 4),        // Google
    Ipv4Addr::new(8, 8, 8, 8),        // Google
    Ipv4Addr::new(84, 200, 69, 80),   // DNS.Watch
    Ipv4Addr::new(84, 200, 70, 40),   // DNS.Watch
    Ipv4Addr::new(9, 9, 9, 9),        // Quad9
];

/// Directories holding dhclient, NetworkManager or networkd leases.
const LEASE_DIRS: &[&str] = &[
    "/var/lib/dhcp",
    "/var/lib/dhclient",
    "/var/lib/NetworkManager",
    "/run/systemd/netif/leases",
];

/// Host name of this machine.
pub fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().to_string()
}

pub fn external_targets() -> BTreeSet<IpAddr> {
    EXTERNAL_TARGETS.iter().copied().map(IpAddr::V4).collect()
}

/// DNS, gateway and DHCP server addresses of the local network, rediscovered
/// on every call.
pub fn internal_targets() -> BTreeSet<IpAddr> {
    let mut targets = BTreeSet::new();

    if let Ok(content) = fs::read_to_string("/etc/resolv.conf") {
        targets.extend(parse_resolv_conf(&content));
    }
    if let Ok(content) = fs::read_to_string("/proc/net/route") {
        targets.extend(parse_default_gateways(&content));
    }
    for dir in LEASE_DIRS {
        targets.extend(lease_servers(Path::new(dir)));
    }

    targets.retain(|ip| !ip.is_loopback() && !ip.is_unspecified());
    debug!("Internal targets: {:?}", targets);
    targets
}

fn lease_servers(dir: &Path) -> Vec<IpAddr> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| fs::read_to_string(path).ok())
        .flat_map(|content| parse_lease_servers(&content))
        .collect()
}

/// `nameserver` lines of a resolv.conf.
pub fn parse_resolv_conf(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("nameserver") => fields.next()?.parse().ok(),
                _ => None,
            }
        })
        .collect()
}

/// Gateways of default routes in `/proc/net/route`.
///
/// Addresses are little-endian hex, e.g. `0101A8C0` is `192.168.1.1`.
pub fn parse_default_gateways(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 || fields[1] != "00000000" {
                return None;
            }
            let gateway = u32::from_str_radix(fields[2], 16).ok()?;
            (gateway != 0).then(|| IpAddr::V4(Ipv4Addr::from(gateway.to_le_bytes())))
        })
        .collect()
}

/// DHCP server identifiers in dhclient (`option dhcp-server-identifier X;`)
/// and key/value (`SERVER_ADDRESS=X`) lease files.
pub fn parse_lease_servers(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            if let Some(rest) = line.strip_prefix("option dhcp-server-identifier") {
                rest.trim().trim_end_matches(';').parse().ok()
            } else if let Some(rest) = line.strip_prefix("SERVER_ADDRESS=") {
                rest.trim().parse().ok()
            } else {
                None
            }
        })
        .collect()
}
