//! The `Metric` sum type and its per-variant payloads.
//!
//! One variant per row of the data-model table; serialization dispatches
//! on the tag carried by `Envelope`, not on a runtime type check.

use serde::{Deserialize, Serialize};

/// Normalized process state, the same four buckets on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessState {
    Running,
    Runnable,
    Waiting,
    #[default]
    Other,
}

/// Where a container's metrics came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerSource {
    Docker,
    Proxmox,
}

/// The kind of guest a container record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Container,
    Lxc,
    Vm,
}

/// Local vs. other filesystem classification (§GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskCategory {
    Local,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetric {
    pub usage_percent: f64,
    pub per_core_percent: Vec<f64>,
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetric {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetric {
    pub device: String,
    pub mountpoint: String,
    pub fs_type: String,
    pub category: DiskCategory,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
    pub inodes_total: u64,
    pub inodes_used: u64,
    pub inodes_used_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskIoMetric {
    pub device: String,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub read_ops_per_sec: f64,
    pub write_ops_per_sec: f64,
    pub read_time_ms: u64,
    pub write_time_ms: u64,
    pub queue_depth: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetric {
    pub name: String,
    pub mac_address: String,
    pub mtu: u32,
    pub link_speed_bps: u64,
    pub rx_bytes_per_sec: f64,
    pub rx_packets_per_sec: f64,
    pub rx_errors_per_sec: f64,
    pub rx_drops_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub tx_packets_per_sec: f64,
    pub tx_errors_per_sec: f64,
    pub tx_drops_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetric {
    pub pid: i32,
    pub name: String,
    pub status: ProcessState,
    pub rss_bytes: u64,
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub num_threads: u32,
    pub threads_running: Option<u32>,
    pub threads_runnable: Option<u32>,
    pub threads_waiting: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetric {
    pub name: String,
    pub load_state: String,
    pub status: String,
    pub substatus: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureMetric {
    pub sensor: String,
    pub current_celsius: f64,
    pub max_celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiMetric {
    pub interface: String,
    pub ssid: String,
    pub signal_dbm: i32,
    pub link_quality_percent: f64,
    pub frequency_ghz: f64,
    pub bitrate_mbps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetric {
    pub id: String,
    pub name: String,
    pub image: String,
    pub source: ContainerSource,
    pub kind: ContainerKind,
    pub state: String,
    pub cpu_percent: f64,
    pub cpu_limit_cores: Option<f64>,
    pub memory_used_bytes: u64,
    pub memory_limit_bytes: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetric {
    pub uptime_seconds: u64,
    pub boot_time_unix: i64,
    pub process_count: u32,
    pub logged_in_users: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePackage {
    pub name: String,
    pub version: String,
    pub security: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatesMetric {
    pub total_pending: u32,
    pub security_pending: u32,
    pub reboot_required: bool,
    pub package_manager: String,
    pub packages: Vec<UpdatePackage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfoMetric {
    pub hostname: String,
    pub os: String,
    pub platform: String,
    pub platform_version: String,
    pub kernel: String,
    pub arch: String,
    pub cpu_model: String,
    pub cpu_cores: u32,
    pub ram_total_bytes: u64,
    pub agent_version: String,
    pub boot_time_unix: i64,
    pub ips: Vec<String>,
}

/// One metric value, tagged by which collector produced it.
///
/// Deliberately *not* `Serialize`/`Deserialize`: the wire shape keeps the
/// tag as a sibling of the payload (`Envelope::type` + `Envelope::data`),
/// which neither an externally- nor internally-tagged derive produces
/// without nesting the tag inside `data`. `Envelope` hand-rolls the
/// dispatch against `type_tag()` instead (see `envelope.rs`).
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Cpu(CpuMetric),
    Memory(MemoryMetric),
    Disk(DiskMetric),
    DiskIo(DiskIoMetric),
    Network(NetworkMetric),
    Process(ProcessMetric),
    Service(ServiceMetric),
    Temperature(TemperatureMetric),
    Wifi(WifiMetric),
    Container(ContainerMetric),
    System(SystemMetric),
    Updates(UpdatesMetric),
    HostInfo(HostInfoMetric),
}

impl Metric {
    /// The wire tag used as `Envelope::type`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Metric::Cpu(_) => "cpu",
            Metric::Memory(_) => "memory",
            Metric::Disk(_) => "disk",
            Metric::DiskIo(_) => "disk_io",
            Metric::Network(_) => "network",
            Metric::Process(_) => "process",
            Metric::Service(_) => "service",
            Metric::Temperature(_) => "temperature",
            Metric::Wifi(_) => "wifi",
            Metric::Container(_) => "container",
            Metric::System(_) => "system",
            Metric::Updates(_) => "updates",
            Metric::HostInfo(_) => "host_info",
        }
    }
}

/// `100 * used / total`, with the zero-guard every percentage derived
/// from a total needs.
pub fn percent(used: f64, total: f64) -> f64 {
    if total == 0.0 { 0.0 } else { 100.0 * used / total }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_zero_total_is_zero() {
        assert_eq!(percent(42.0, 0.0), 0.0);
        assert_eq!(percent(0.0, 0.0), 0.0);
    }

    #[test]
    fn percent_normal() {
        assert!((percent(25.0, 200.0) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn type_tag_matches_variant() {
        let m = Metric::System(SystemMetric {
            uptime_seconds: 1,
            boot_time_unix: 2,
            process_count: 3,
            logged_in_users: 1,
        });
        assert_eq!(m.type_tag(), "system");
    }
}
