//! Linux platform probes, built on `/proc` and `/sys`.

mod procfs;
mod services;
mod thermal;
mod updates;
mod wifi;

use spectra_types::{
    CpuProbe, CpuSnapshotRaw, DiskCategory, DiskMetric, DiskProbe, LoadAvgRaw, Metric,
    MemoryProbe, MemoryRaw, MountRaw, NetIfRaw, NetworkProbe, PlatformProbes, ProcRaw,
    ProcessProbe, Result, ServiceProbe, SystemProbe, SystemMetric, HostInfoMetric,
    TemperatureProbe, UpdatesProbe, WifiProbe,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cached `MemTotal`, written once per memory-collector tick, read by the
/// process collector (memory %) and host-info probe without reparsing
/// `/proc/meminfo` (§4.3.2 side contract).
static CACHED_MEM_TOTAL: AtomicU64 = AtomicU64::new(0);

const LOCAL_FS_TYPES: &[&str] = &[
    "ext2", "ext3", "ext4", "xfs", "btrfs", "zfs", "ntfs", "vfat", "exfat", "hfsplus", "f2fs",
    "bcachefs",
];

fn classify_fs(fs_type: &str) -> DiskCategory {
    if LOCAL_FS_TYPES.contains(&fs_type) {
        DiskCategory::Local
    } else {
        DiskCategory::Other
    }
}

pub struct LinuxProbes {
    cpu: LinuxCpuProbe,
    memory: LinuxMemoryProbe,
    disk: LinuxDiskProbe,
    network: LinuxNetworkProbe,
    process: LinuxProcessProbe,
    service: LinuxServiceProbe,
    temperature: LinuxTemperatureProbe,
    wifi: LinuxWifiProbe,
    updates: LinuxUpdatesProbe,
    system: LinuxSystemProbe,
}

impl LinuxProbes {
    pub fn new() -> Self {
        Self {
            cpu: LinuxCpuProbe,
            memory: LinuxMemoryProbe,
            disk: LinuxDiskProbe,
            network: LinuxNetworkProbe,
            process: LinuxProcessProbe,
            service: LinuxServiceProbe,
            temperature: LinuxTemperatureProbe,
            wifi: LinuxWifiProbe,
            updates: LinuxUpdatesProbe,
            system: LinuxSystemProbe,
        }
    }
}

impl Default for LinuxProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformProbes for LinuxProbes {
    fn cpu(&self) -> &dyn CpuProbe {
        &self.cpu
    }
    fn memory(&self) -> &dyn MemoryProbe {
        &self.memory
    }
    fn disk(&self) -> &dyn DiskProbe {
        &self.disk
    }
    fn network(&self) -> &dyn NetworkProbe {
        &self.network
    }
    fn process(&self) -> &dyn ProcessProbe {
        &self.process
    }
    fn service(&self) -> &dyn ServiceProbe {
        &self.service
    }
    fn temperature(&self) -> &dyn TemperatureProbe {
        &self.temperature
    }
    fn wifi(&self) -> &dyn WifiProbe {
        &self.wifi
    }
    fn updates(&self) -> &dyn UpdatesProbe {
        &self.updates
    }
    fn system(&self) -> &dyn SystemProbe {
        &self.system
    }
}

struct LinuxCpuProbe;
impl CpuProbe for LinuxCpuProbe {
    fn read(&self) -> Result<CpuSnapshotRaw> {
        procfs::read_cpu_snapshot()
    }
    fn read_load_average(&self) -> Result<LoadAvgRaw> {
        procfs::read_load_average()
    }
}

struct LinuxMemoryProbe;
impl MemoryProbe for LinuxMemoryProbe {
    fn read(&self) -> Result<MemoryRaw> {
        let mem = procfs::read_memory()?;
        CACHED_MEM_TOTAL.store(mem.total_bytes, Ordering::Relaxed);
        Ok(mem)
    }
}

struct LinuxDiskProbe;
impl DiskProbe for LinuxDiskProbe {
    fn list_mounts(&self) -> Result<Vec<MountRaw>> {
        procfs::read_mounts()
    }

    fn read_usage(&self, mount: &MountRaw) -> Result<Metric> {
        let (total_bytes, used_bytes, available_bytes, inodes_total) =
            procfs::read_disk_usage(&mount.mount_point)?;
        Ok(Metric::Disk(DiskMetric {
            device: mount.device.clone(),
            mountpoint: mount.mount_point.clone(),
            fs_type: mount.fs_type.clone(),
            category: classify_fs(&mount.fs_type),
            total_bytes,
            used_bytes,
            available_bytes,
            used_percent: spectra_types::percent(used_bytes as f64, total_bytes as f64),
            inodes_total,
            inodes_used: 0,
            inodes_used_percent: 0.0,
        }))
    }

    fn read_io(&self) -> Result<Vec<spectra_types::DiskIoRaw>> {
        procfs::read_diskstats()
    }
}

struct LinuxNetworkProbe;
impl NetworkProbe for LinuxNetworkProbe {
    fn read_interfaces(&self) -> Result<Vec<NetIfRaw>> {
        procfs::read_net_interfaces()
    }
}

struct LinuxProcessProbe;
impl ProcessProbe for LinuxProcessProbe {
    fn list(&self) -> Result<Vec<ProcRaw>> {
        let pids = procfs::list_pids()?;
        Ok(pids.into_iter().filter_map(|pid| procfs::read_process(pid).ok()).collect())
    }
}

struct LinuxServiceProbe;
impl ServiceProbe for LinuxServiceProbe {
    fn list(&self) -> Result<Vec<Metric>> {
        services::list_services()
    }
}

struct LinuxTemperatureProbe;
impl TemperatureProbe for LinuxTemperatureProbe {
    fn read(&self) -> Result<Vec<Metric>> {
        thermal::read_temperatures()
    }
}

struct LinuxWifiProbe;
impl WifiProbe for LinuxWifiProbe {
    fn read(&self) -> Result<Vec<Metric>> {
        wifi::read_wifi()
    }
}

struct LinuxUpdatesProbe;
impl UpdatesProbe for LinuxUpdatesProbe {
    fn read(&self) -> Result<Metric> {
        updates::read_updates().map(Metric::Updates)
    }
}

struct LinuxSystemProbe;
impl SystemProbe for LinuxSystemProbe {
    fn read(&self) -> Result<Metric> {
        let (uptime_seconds, boot_time_unix) = procfs::read_uptime_and_boot_time()?;
        let process_count = procfs::list_pids()?.len() as u32;
        let logged_in_users = count_logged_in_users();

        Ok(Metric::System(SystemMetric { uptime_seconds, boot_time_unix, process_count, logged_in_users }))
    }

    fn read_host_info(&self) -> Result<Metric> {
        let (_, boot_time_unix) = procfs::read_uptime_and_boot_time()?;
        let mem = procfs::read_memory().unwrap_or_default();
        let hostname = std::env::var("HOSTNAME").ok().or_else(hostname_from_proc).unwrap_or_else(|| "unknown".into());

        Ok(Metric::HostInfo(HostInfoMetric {
            hostname,
            os: "linux".into(),
            platform: read_os_release_field("ID").unwrap_or_else(|| "linux".into()),
            platform_version: read_os_release_field("VERSION_ID").unwrap_or_default(),
            kernel: read_kernel_release().unwrap_or_default(),
            arch: std::env::consts::ARCH.into(),
            cpu_model: read_cpu_model().unwrap_or_default(),
            cpu_cores: num_cpus(),
            ram_total_bytes: mem.total_bytes,
            agent_version: env!("CARGO_PKG_VERSION").into(),
            boot_time_unix,
            ips: Vec::new(),
        }))
    }
}

fn count_logged_in_users() -> u32 {
    std::process::Command::new("who")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).lines().count() as u32)
        .unwrap_or(0)
}

fn hostname_from_proc() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/hostname").ok().map(|s| s.trim().to_string())
}

fn read_os_release_field(key: &str) -> Option<String> {
    let content = std::fs::read_to_string("/etc/os-release").ok()?;
    content
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{key}=")).map(|v| v.trim_matches('"').to_string()))
}

fn read_kernel_release() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/osrelease").ok().map(|s| s.trim().to_string())
}

fn read_cpu_model() -> Option<String> {
    let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    content.lines().find_map(|l| l.strip_prefix("model name\t: ").map(|s| s.to_string()))
}

fn num_cpus() -> u32 {
    std::fs::read_to_string("/proc/cpuinfo")
        .map(|c| c.lines().filter(|l| l.starts_with("processor")).count() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_local_filesystems() {
        assert_eq!(classify_fs("ext4"), DiskCategory::Local);
        assert_eq!(classify_fs("xfs"), DiskCategory::Local);
        assert_eq!(classify_fs("nfs"), DiskCategory::Other);
        assert_eq!(classify_fs("cifs"), DiskCategory::Other);
    }
}
