//! FreeBSD platform probes, built on `sysctl(3)` and the BSD libc syscalls.
//!
//! Temperature, Wi-Fi, and pending-update signals have no defined source
//! for FreeBSD (§4.3.9–§4.3.11 only specify Linux and/or Windows); those
//! probes return [`spectra_types::Error::NotSupported`] rather than
//! fabricating data.

mod sysctl;

use spectra_types::{
    CpuProbe, CpuSnapshotRaw, DiskCategory, DiskMetric, DiskProbe, Error, HostInfoMetric,
    LoadAvgRaw, Metric, MemoryProbe, MemoryRaw, MountRaw, NetIfRaw, NetworkProbe, PlatformProbes,
    ProcRaw, ProcessProbe, Result, ServiceMetric, ServiceProbe, SystemMetric, SystemProbe,
    TemperatureProbe, UpdatesProbe, WifiProbe,
};
use std::process::Command;

const LOCAL_FS_TYPES: &[&str] = &["ufs", "zfs", "ext2fs", "msdosfs", "ntfs"];

fn classify_fs(fs_type: &str) -> DiskCategory {
    if LOCAL_FS_TYPES.contains(&fs_type) {
        DiskCategory::Local
    } else {
        DiskCategory::Other
    }
}

pub struct FreeBsdProbes {
    cpu: FreeBsdCpuProbe,
    memory: FreeBsdMemoryProbe,
    disk: FreeBsdDiskProbe,
    network: FreeBsdNetworkProbe,
    process: FreeBsdProcessProbe,
    service: FreeBsdServiceProbe,
    temperature: FreeBsdTemperatureProbe,
    wifi: FreeBsdWifiProbe,
    updates: FreeBsdUpdatesProbe,
    system: FreeBsdSystemProbe,
}

impl FreeBsdProbes {
    pub fn new() -> Self {
        Self {
            cpu: FreeBsdCpuProbe,
            memory: FreeBsdMemoryProbe,
            disk: FreeBsdDiskProbe,
            network: FreeBsdNetworkProbe,
            process: FreeBsdProcessProbe,
            service: FreeBsdServiceProbe,
            temperature: FreeBsdTemperatureProbe,
            wifi: FreeBsdWifiProbe,
            updates: FreeBsdUpdatesProbe,
            system: FreeBsdSystemProbe,
        }
    }
}

impl Default for FreeBsdProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformProbes for FreeBsdProbes {
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

struct FreeBsdCpuProbe;
impl CpuProbe for FreeBsdCpuProbe {
    fn read(&self) -> Result<CpuSnapshotRaw> {
        sysctl::read_cpu_snapshot()
    }
    fn read_load_average(&self) -> Result<LoadAvgRaw> {
        sysctl::read_load_average()
    }
}

struct FreeBsdMemoryProbe;
impl MemoryProbe for FreeBsdMemoryProbe {
    fn read(&self) -> Result<MemoryRaw> {
        sysctl::read_memory()
    }
}

struct FreeBsdDiskProbe;
impl DiskProbe for FreeBsdDiskProbe {
    fn list_mounts(&self) -> Result<Vec<MountRaw>> {
        sysctl::read_mounts()
    }

    fn read_usage(&self, mount: &MountRaw) -> Result<Metric> {
        let (total_bytes, used_bytes, available_bytes, inodes_total) =
            sysctl::read_disk_usage(&mount.mount_point)?;
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
        sysctl::read_disk_io()
    }
}

struct FreeBsdNetworkProbe;
impl NetworkProbe for FreeBsdNetworkProbe {
    fn read_interfaces(&self) -> Result<Vec<NetIfRaw>> {
        sysctl::read_net_interfaces()
    }
}

struct FreeBsdProcessProbe;
impl ProcessProbe for FreeBsdProcessProbe {
    fn list(&self) -> Result<Vec<ProcRaw>> {
        sysctl::list_processes()
    }
}

/// `service -e` lists the one-line-per-enabled-service set; running state
/// comes from checking each for a live rc.d status.
struct FreeBsdServiceProbe;
impl ServiceProbe for FreeBsdServiceProbe {
    fn list(&self) -> Result<Vec<Metric>> {
        let output = Command::new("service").arg("-e").output().map_err(Error::Io)?;
        if !output.status.success() {
            return Ok(Vec::new());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let mut services = Vec::new();
        for path in text.lines() {
            let Some(name) = path.rsplit('/').next() else { continue };
            let status_output = Command::new(path).arg("status").output();
            let (status, substatus) = match status_output {
                Ok(o) if o.status.success() => ("active", "running"),
                Ok(_) => ("active", "stopped"),
                Err(_) => ("unknown", "unknown"),
            };

            services.push(Metric::Service(ServiceMetric {
                name: name.to_string(),
                load_state: "loaded".into(),
                status: status.into(),
                substatus: substatus.into(),
                description: String::new(),
            }));
        }

        Ok(services)
    }
}

struct FreeBsdTemperatureProbe;
impl TemperatureProbe for FreeBsdTemperatureProbe {
    fn read(&self) -> Result<Vec<Metric>> {
        Err(Error::NotSupported)
    }
}

struct FreeBsdWifiProbe;
impl WifiProbe for FreeBsdWifiProbe {
    fn read(&self) -> Result<Vec<Metric>> {
        Err(Error::NotSupported)
    }
}

struct FreeBsdUpdatesProbe;
impl UpdatesProbe for FreeBsdUpdatesProbe {
    fn read(&self) -> Result<Metric> {
        Err(Error::NotSupported)
    }
}

struct FreeBsdSystemProbe;
impl SystemProbe for FreeBsdSystemProbe {
    fn read(&self) -> Result<Metric> {
        let boot_time_unix = sysctl::read_boot_time()?;
        let uptime_seconds = current_unix_time().saturating_sub(boot_time_unix).max(0) as u64;
        let process_count = sysctl::list_processes()?.len() as u32;
        let logged_in_users = count_logged_in_users();

        Ok(Metric::System(SystemMetric { uptime_seconds, boot_time_unix, process_count, logged_in_users }))
    }

    fn read_host_info(&self) -> Result<Metric> {
        let boot_time_unix = sysctl::read_boot_time()?;
        let mem = sysctl::read_memory().unwrap_or_default();
        let hostname = std::env::var("HOSTNAME").ok().or_else(read_hostname).unwrap_or_else(|| "unknown".into());

        Ok(Metric::HostInfo(HostInfoMetric {
            hostname,
            os: "freebsd".into(),
            platform: "freebsd".into(),
            platform_version: read_uname("-r"),
            kernel: read_uname("-v"),
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

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn count_logged_in_users() -> u32 {
    Command::new("who").output().map(|o| String::from_utf8_lossy(&o.stdout).lines().count() as u32).unwrap_or(0)
}

fn read_hostname() -> Option<String> {
    Command::new("hostname").output().ok().map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

fn read_uname(flag: &str) -> String {
    Command::new("uname").arg(flag).output().map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string()).unwrap_or_default()
}

fn read_cpu_model() -> Option<String> {
    Command::new("sysctl")
        .args(["-n", "hw.model"])
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

fn num_cpus() -> u32 {
    Command::new("sysctl")
        .args(["-n", "hw.ncpu"])
        .output()
        .ok()
        .and_then(|o| String::from_utf8_lossy(&o.stdout).trim().parse().ok())
        .unwrap_or(1)
}
