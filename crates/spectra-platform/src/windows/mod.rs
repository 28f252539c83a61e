//! Windows platform probes, built on `windows-sys`, the native NT API,
//! and WMI.
//!
//! Pending-update detection has no Windows source in this spec (§4.3.11
//! only defines Linux package managers); that probe returns
//! [`spectra_types::Error::NotSupported`].

mod cpu;
mod disk;
mod ffi;
mod memory;
mod network;
mod process;
mod services;
mod thermal;
mod wifi;

use spectra_types::{
    CpuProbe, CpuSnapshotRaw, DiskCategory, DiskMetric, DiskProbe, Error, HostInfoMetric,
    LoadAvgRaw, Metric, MemoryProbe, MemoryRaw, MountRaw, NetIfRaw, NetworkProbe, PlatformProbes,
    ProcRaw, ProcessProbe, Result, ServiceProbe, SystemMetric, SystemProbe, TemperatureProbe,
    UpdatesProbe, WifiProbe,
};
use windows_sys::Win32::System::SystemInformation::GetTickCount64;

fn classify_fs(fs_type: &str) -> DiskCategory {
    match fs_type {
        "NTFS" | "REFS" | "FAT32" | "FAT" | "EXFAT" => DiskCategory::Local,
        _ => DiskCategory::Other,
    }
}

pub struct WindowsProbes {
    cpu: WindowsCpuProbe,
    memory: WindowsMemoryProbe,
    disk: WindowsDiskProbe,
    network: WindowsNetworkProbe,
    process: WindowsProcessProbe,
    service: WindowsServiceProbe,
    temperature: WindowsTemperatureProbe,
    wifi: WindowsWifiProbe,
    updates: WindowsUpdatesProbe,
    system: WindowsSystemProbe,
}

impl WindowsProbes {
    pub fn new() -> Self {
        Self {
            cpu: WindowsCpuProbe,
            memory: WindowsMemoryProbe,
            disk: WindowsDiskProbe,
            network: WindowsNetworkProbe,
            process: WindowsProcessProbe,
            service: WindowsServiceProbe,
            temperature: WindowsTemperatureProbe,
            wifi: WindowsWifiProbe,
            updates: WindowsUpdatesProbe,
            system: WindowsSystemProbe,
        }
    }
}

impl Default for WindowsProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformProbes for WindowsProbes {
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

struct WindowsCpuProbe;
impl CpuProbe for WindowsCpuProbe {
    fn read(&self) -> Result<CpuSnapshotRaw> {
        cpu::read()
    }
    fn read_load_average(&self) -> Result<LoadAvgRaw> {
        cpu::read_load_average()
    }
}

struct WindowsMemoryProbe;
impl MemoryProbe for WindowsMemoryProbe {
    fn read(&self) -> Result<MemoryRaw> {
        memory::read()
    }
}

struct WindowsDiskProbe;
impl DiskProbe for WindowsDiskProbe {
    fn list_mounts(&self) -> Result<Vec<MountRaw>> {
        disk::list_mounts()
    }

    fn read_usage(&self, mount: &MountRaw) -> Result<Metric> {
        let (total_bytes, used_bytes, available_bytes, inodes_total) = disk::read_usage(&mount.mount_point)?;
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
        disk::read_io()
    }

    fn list_physical_disks(&self) -> Result<Vec<spectra_types::PhysicalDiskRaw>> {
        Ok(disk::list_physical_disks())
    }

    fn drive_letters_by_physical_index(&self) -> Result<std::collections::HashMap<u32, Vec<String>>> {
        Ok(disk::drive_letters_by_physical_index())
    }
}

struct WindowsNetworkProbe;
impl NetworkProbe for WindowsNetworkProbe {
    fn read_interfaces(&self) -> Result<Vec<NetIfRaw>> {
        network::read_interfaces()
    }
}

struct WindowsProcessProbe;
impl ProcessProbe for WindowsProcessProbe {
    fn list(&self) -> Result<Vec<ProcRaw>> {
        process::list()
    }
}

struct WindowsServiceProbe;
impl ServiceProbe for WindowsServiceProbe {
    fn list(&self) -> Result<Vec<Metric>> {
        services::list()
    }
}

struct WindowsTemperatureProbe;
impl TemperatureProbe for WindowsTemperatureProbe {
    fn read(&self) -> Result<Vec<Metric>> {
        thermal::read()
    }
}

struct WindowsWifiProbe;
impl WifiProbe for WindowsWifiProbe {
    fn read(&self) -> Result<Vec<Metric>> {
        wifi::read()
    }
}

struct WindowsUpdatesProbe;
impl UpdatesProbe for WindowsUpdatesProbe {
    fn read(&self) -> Result<Metric> {
        Err(Error::NotSupported)
    }
}

struct WindowsSystemProbe;
impl SystemProbe for WindowsSystemProbe {
    fn read(&self) -> Result<Metric> {
        let uptime_seconds = unsafe { GetTickCount64() } / 1000;
        let boot_time_unix = current_unix_time() - uptime_seconds as i64;
        let process_count = process::list()?.len() as u32;
        let logged_in_users = count_logged_in_users();

        Ok(Metric::System(SystemMetric { uptime_seconds, boot_time_unix, process_count, logged_in_users }))
    }

    fn read_host_info(&self) -> Result<Metric> {
        let uptime_seconds = unsafe { GetTickCount64() } / 1000;
        let boot_time_unix = current_unix_time() - uptime_seconds as i64;
        let mem = memory::read().unwrap_or_default();

        Ok(Metric::HostInfo(HostInfoMetric {
            hostname: std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".into()),
            os: "windows".into(),
            platform: "windows".into(),
            platform_version: read_registry_product_name(),
            kernel: std::env::var("OS").unwrap_or_default(),
            arch: std::env::consts::ARCH.into(),
            cpu_model: std::env::var("PROCESSOR_IDENTIFIER").unwrap_or_default(),
            cpu_cores: std::env::var("NUMBER_OF_PROCESSORS").ok().and_then(|s| s.parse().ok()).unwrap_or(1),
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

/// `quser`'s header line is skipped the same way `who`'s isn't needed to
/// be on Unix (it has none); non-header lines each represent one session.
fn count_logged_in_users() -> u32 {
    std::process::Command::new("quser")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).lines().skip(1).count() as u32)
        .unwrap_or(0)
}

fn read_registry_product_name() -> String {
    std::env::var("OS").unwrap_or_default()
}
