//! Raw counter records.
//!
//! Platform probes produce these; the delta engine in `spectra-delta`
//! consumes `(previous, current, elapsed_seconds)` triples and never reads
//! counter sources itself. Fields absent on a given OS are explicitly
//! zeroed, never left as `None`, so the delta math stays uniform.

use std::collections::BTreeMap;

/// One CPU time-accounting sample, aggregate or per-core.
///
/// `Total` is *not* stored here: it is `User + Nice + System + Idle +
/// IOWait + IRQ + SoftIRQ + Steal` on Linux, recomputed by the delta
/// engine so guest/guest_nice (already folded into User/Nice) are never
/// double counted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimesRaw {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimesRaw {
    /// `true` if every tracked field of `self` is >= the matching field of
    /// `other` (the monotonicity check the delta engine needs before it
    /// will trust a sample pair).
    pub fn monotonic_since(&self, other: &CpuTimesRaw) -> bool {
        self.user >= other.user
            && self.nice >= other.nice
            && self.system >= other.system
            && self.idle >= other.idle
            && self.iowait >= other.iowait
            && self.irq >= other.irq
            && self.softirq >= other.softirq
            && self.steal >= other.steal
    }
}

/// A CPU snapshot: the aggregate sample plus one entry per logical core,
/// keyed `"cpu0".."cpu{N-1}"` the way `/proc/stat` already names them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSnapshotRaw {
    pub aggregate: CpuTimesRaw,
    pub cores: BTreeMap<String, CpuTimesRaw>,
}

/// Raw memory counters, already converted to bytes by the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryRaw {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_free_bytes: u64,
}

/// Raw load-average sample (already scaled to fractional loads by the
/// probe; FreeBSD's `vm.loadavg` fixed-point divide happens at the probe
/// boundary, not here).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAvgRaw {
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
}

/// Cumulative per-device disk I/O counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskIoRaw {
    pub device: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub read_time_ms: u64,
    pub write_time_ms: u64,
    pub io_in_progress: u64,
}

/// Cumulative per-interface network counters, keyed by a stable identifier
/// (kernel ifindex on Linux/Windows/FreeBSD).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetIfRaw {
    pub ifindex: u32,
    pub name: String,
    pub mac_address: String,
    pub mtu: u32,
    pub link_speed_bps: u64,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_drops: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_drops: u64,
}

/// Cumulative per-process counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcRaw {
    pub pid: i32,
    pub name: String,
    pub raw_state: RawProcessState,
    pub cpu_ticks: u64,
    pub rss_bytes: u64,
    pub num_threads: u32,
    pub threads_running: u32,
    pub threads_runnable: u32,
    pub threads_waiting: u32,
}

/// Platform-native process state before normalization into
/// `spectra_types::ProcessState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawProcessState {
    #[default]
    Unknown,
    LinuxRunning,
    LinuxRunnableNoCpu,
    LinuxSleeping,
    LinuxStopped,
    FreeBsdRun,
    FreeBsdSleep,
    FreeBsdIdle,
    FreeBsdWait,
    FreeBsdLock,
    FreeBsdStop,
    FreeBsdZombie,
    WindowsThreadDerived,
}

/// A mounted filesystem's identity, as read off the host (pre-filtering).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountRaw {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
}

/// Windows physical-disk identity, as read from `IOCTL_STORAGE_QUERY_PROPERTY`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalDiskRaw {
    pub index: u32,
    pub device_id: String,
    pub model: String,
    pub bus_type: String,
}
