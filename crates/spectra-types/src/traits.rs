//! Probe traits implemented once per supported OS.
//!
//! One narrow trait per signal, each returning a *raw* record with no
//! derivation. `spectra-platform` provides one implementation per OS;
//! `spectra-delta` and the collector tasks in `spectra-agent` are the only
//! callers, and they never match on which OS produced the record.

use crate::raw::{
    CpuSnapshotRaw, DiskIoRaw, LoadAvgRaw, MemoryRaw, MountRaw, NetIfRaw, PhysicalDiskRaw, ProcRaw,
};
use crate::{Metric, Result};
use std::collections::HashMap;

/// Reads `/proc/stat`, `sysctl kern.cp_time[s]`, or
/// `NtQuerySystemInformation` depending on platform.
pub trait CpuProbe: Send + Sync {
    fn read(&self) -> Result<CpuSnapshotRaw>;
    fn read_load_average(&self) -> Result<LoadAvgRaw>;
}

pub trait MemoryProbe: Send + Sync {
    fn read(&self) -> Result<MemoryRaw>;
}

/// Disk usage is computed per mountpoint, so the probe needs the caller to
/// hand it the current mount list (from the drive cache); disk I/O is
/// read once for every device the kernel currently exposes.
pub trait DiskProbe: Send + Sync {
    fn list_mounts(&self) -> Result<Vec<MountRaw>>;
    fn read_usage(&self, mount: &MountRaw) -> Result<Metric>;
    fn read_io(&self) -> Result<Vec<DiskIoRaw>>;

    /// Windows-only (§4.4): the physical-disk descriptors backing the
    /// drive cache. Other platforms have no separate physical/logical
    /// split to cache, so the default is empty.
    fn list_physical_disks(&self) -> Result<Vec<PhysicalDiskRaw>> {
        Ok(Vec::new())
    }

    /// Windows-only (§4.4): `{physical disk index -> [drive letter, ...]}`,
    /// the drive cache's other map.
    fn drive_letters_by_physical_index(&self) -> Result<HashMap<u32, Vec<String>>> {
        Ok(HashMap::new())
    }
}

pub trait NetworkProbe: Send + Sync {
    fn read_interfaces(&self) -> Result<Vec<NetIfRaw>>;
}

pub trait ProcessProbe: Send + Sync {
    fn list(&self) -> Result<Vec<ProcRaw>>;
}

pub trait ServiceProbe: Send + Sync {
    fn list(&self) -> Result<Vec<Metric>>;
}

pub trait TemperatureProbe: Send + Sync {
    fn read(&self) -> Result<Vec<Metric>>;
}

pub trait WifiProbe: Send + Sync {
    fn read(&self) -> Result<Vec<Metric>>;
}

pub trait UpdatesProbe: Send + Sync {
    fn read(&self) -> Result<Metric>;
}

pub trait SystemProbe: Send + Sync {
    fn read(&self) -> Result<Metric>;
    fn read_host_info(&self) -> Result<Metric>;
}

/// Aggregate bundle of every probe for one OS; the orchestrator builds one
/// of these per platform at startup (§4.5).
pub trait PlatformProbes: Send + Sync {
    fn cpu(&self) -> &dyn CpuProbe;
    fn memory(&self) -> &dyn MemoryProbe;
    fn disk(&self) -> &dyn DiskProbe;
    fn network(&self) -> &dyn NetworkProbe;
    fn process(&self) -> &dyn ProcessProbe;
    fn service(&self) -> &dyn ServiceProbe;
    fn temperature(&self) -> &dyn TemperatureProbe;
    fn wifi(&self) -> &dyn WifiProbe;
    fn updates(&self) -> &dyn UpdatesProbe;
    fn system(&self) -> &dyn SystemProbe;
}
