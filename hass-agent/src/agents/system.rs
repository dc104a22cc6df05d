//! System health agent
//!
//! Publishes boot time, battery, memory pools, volumes, disk and network
//! throughput, processor load, memory use by kind and reachability of the
//! local network and the internet.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Instant;

use tracing::debug;

use crate::discovery::{SensorDescriptor, SensorPublisher};
use crate::error::Result;
use crate::metrics::io::{DiskIoCounter, DiskIoRate, NetworkIoCounter, NetworkIoRate};
use crate::metrics::{to_mib, Capacity, MetricsProvider};
use crate::network;
use crate::probe::{self, Pinger, PROBE_TIMEOUT};
use crate::registry::{Named, ResourceRegistry};

/// Produces the probe targets of one cycle.
pub type TargetSource = Box<dyn Fn() -> BTreeSet<IpAddr> + Send + Sync>;

pub struct SystemAgent {
    publisher: SensorPublisher,
    metrics: Box<dyn MetricsProvider>,
    pinger: Box<dyn Pinger>,
    disk_io: ResourceRegistry<DiskIoCounter>,
    network_io: ResourceRegistry<NetworkIoCounter>,
    internal_targets: TargetSource,
    external_targets: TargetSource,
}

fn diagnostic(name: String, icon: &'static str, unit: &'static str) -> SensorDescriptor {
    SensorDescriptor::sensor(name)
        .icon(icon)
        .measurement()
        .unit(unit)
        .diagnostic()
}

fn one_decimal(value: f64) -> String {
    format!("{:.1}", value)
}

impl SystemAgent {
    pub fn new(
        publisher: SensorPublisher,
        metrics: Box<dyn MetricsProvider>,
        pinger: Box<dyn Pinger>,
    ) -> Self {
        Self {
            publisher,
            metrics,
            pinger,
            disk_io: ResourceRegistry::new("Disk"),
            network_io: ResourceRegistry::new("Network"),
            internal_targets: Box::new(network::internal_targets),
            external_targets: Box::new(network::external_targets),
        }
    }

    /// Replace the probe target discovery.
    pub fn with_targets(mut self, internal: TargetSource, external: TargetSource) -> Self {
        self.internal_targets = internal;
        self.external_targets = external;
        self
    }

    pub fn publisher(&self) -> &SensorPublisher {
        &self.publisher
    }

    /// Prime the throughput counters so the first execution reports rates.
    pub async fn start(&mut self) -> Result<()> {
        self.reconcile_counters();
        Ok(())
    }

    pub async fn execute(&mut self) -> Result<()> {
        debug!("Execute: Start");
        self.publisher.begin_cycle();

        self.publish_boot_and_battery().await?;

        for pool in self.metrics.memory() {
            self.publish_capacity(&pool, "mdi:memory", "MiB", false).await?;
        }

        let volumes = self.metrics.volumes();
        if !volumes.is_empty() {
            for volume in Named::with_total(volumes) {
                let labeled = Named::new(format!("Disk {}", volume.name), volume.value);
                self.publish_capacity(&labeled, "mdi:harddisk", "GiB", true).await?;
            }
        }

        self.publish_throughput().await?;

        self.publish_processor().await?;

        for kind in self.metrics.memory_breakdown() {
            let sensor = diagnostic(format!("Memory {} type", kind.name), "mdi:memory", "MiB");
            self.publisher
                .publish_sensor(&sensor, Some(one_decimal(to_mib(kind.value))))
                .await?;
        }

        let internal = (self.internal_targets)();
        let ping = probe::probe(self.pinger.as_ref(), &internal, PROBE_TIMEOUT).await;
        let sensor = diagnostic("Ping Internal".into(), "mdi:lan", "ms");
        self.publisher.publish_sensor(&sensor, ping.map(one_decimal)).await?;

        let external = (self.external_targets)();
        let ping = probe::probe(self.pinger.as_ref(), &external, PROBE_TIMEOUT).await;
        let sensor = diagnostic("Ping External".into(), "mdi:wan", "ms");
        self.publisher.publish_sensor(&sensor, ping.map(one_decimal)).await?;

        debug!("Execute: Finish");
        Ok(())
    }

    async fn publish_boot_and_battery(&mut self) -> Result<()> {
        let last_boot = self.metrics.last_boot();
        let sensor = SensorDescriptor::sensor("Last Reboot")
            .icon("mdi:restart")
            .device_class("timestamp")
            .diagnostic();
        self.publisher
            .publish_sensor(
                &sensor,
                last_boot.map(|boot| boot.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            )
            .await?;

        let battery = self.metrics.battery_level();
        let sensor = diagnostic("Battery Level".into(), "mdi:battery-charging", "%")
            .device_class("battery");
        self.publisher
            .publish_sensor(&sensor, battery.map(|level| format!("{:.0}", level)))
            .await
    }

    /// Performance against the rated frequency, utility (use scaled by
    /// performance) and use.
    async fn publish_processor(&mut self) -> Result<()> {
        let icon = if cfg!(target_pointer_width = "64") {
            "mdi:cpu-64-bit"
        } else {
            "mdi:cpu-32-bit"
        };
        let usage = self.metrics.cpu_usage();
        let performance = self.metrics.processor_performance();
        let utility = usage
            .zip(performance)
            .map(|(usage, performance)| usage * performance / 100.0);

        let sensors = [
            ("Processor performance", performance),
            ("Processor utility", utility),
            ("Processor use", usage),
        ];
        for (name, value) in sensors {
            let sensor = diagnostic(name.into(), icon, "%");
            self.publisher.publish_sensor(&sensor, value.map(one_decimal)).await?;
        }
        Ok(())
    }

    /// `{name} total/free/use/use (percent)`, in MiB or GiB.
    async fn publish_capacity(
        &mut self,
        pool: &Named<Capacity>,
        icon: &'static str,
        unit: &'static str,
        in_gib: bool,
    ) -> Result<()> {
        let capacity = &pool.value;
        let (total, free, used) = if in_gib {
            (capacity.total_gib(), capacity.free_gib(), capacity.used_gib())
        } else {
            (capacity.total_mib(), capacity.free_mib(), capacity.used_mib())
        };

        for (suffix, value) in [("total", total), ("free", free), ("use", used)] {
            let sensor = diagnostic(format!("{} {}", pool.name, suffix), icon, unit);
            self.publisher.publish_sensor(&sensor, Some(one_decimal(value))).await?;
        }

        let sensor = diagnostic(format!("{} use (percent)", pool.name), icon, "%");
        self.publisher
            .publish_sensor(&sensor, capacity.used_percent().map(one_decimal))
            .await
    }

    async fn publish_throughput(&mut self) -> Result<()> {
        let (disk_rates, network_rates) = self.reconcile_counters();

        if !disk_rates.is_empty() {
            for io in Named::with_total(disk_rates) {
                let sensors = [
                    ("total", "mdi:harddisk", io.value.total_mib_per_sec()),
                    ("read", "mdi:folder-upload", io.value.read_mib_per_sec()),
                    ("write", "mdi:folder-download", io.value.write_mib_per_sec()),
                ];
                for (suffix, icon, value) in sensors {
                    let sensor = diagnostic(format!("DiskIO {} {}", io.name, suffix), icon, "MiB/s");
                    self.publisher.publish_sensor(&sensor, Some(one_decimal(value))).await?;
                }
            }
        }

        if !network_rates.is_empty() {
            for io in Named::with_total(network_rates) {
                let sensors = [
                    ("total", "mdi:network", io.value.total_kib_per_sec()),
                    ("received", "mdi:download-network", io.value.received_kib_per_sec()),
                    ("sent", "mdi:upload-network", io.value.sent_kib_per_sec()),
                    ("bandwidth", "mdi:network", io.value.bandwidth_kib_per_sec()),
                ];
                for (suffix, icon, value) in sensors {
                    let sensor = diagnostic(format!("NetworkIO {} {}", io.name, suffix), icon, "KiB/s");
                    self.publisher.publish_sensor(&sensor, Some(one_decimal(value))).await?;
                }
            }
        }

        Ok(())
    }

    fn reconcile_counters(&mut self) -> (Vec<Named<DiskIoRate>>, Vec<Named<NetworkIoRate>>) {
        let now = Instant::now();
        let disks = self.disk_io.reconcile(self.metrics.disk_io(), now);
        let networks = self.network_io.reconcile(self.metrics.network_io(), now);
        (disks.rates, networks.rates)
    }
}
