//! Per-core CPU accounting via `NtQuerySystemInformation`
//! (`SystemProcessorPerformanceInformation`, §4.3.1).

use super::ffi::{self, SystemProcessorPerformanceInformation, SYSTEM_PROCESSOR_PERFORMANCE_INFORMATION};
use spectra_types::{CpuSnapshotRaw, CpuTimesRaw, Error, LoadAvgRaw, Result};
use std::collections::BTreeMap;
use std::mem;

fn read_per_core() -> Result<Vec<SystemProcessorPerformanceInformation>> {
    let buf = ffi::query_system_information(SYSTEM_PROCESSOR_PERFORMANCE_INFORMATION);
    let entry_size = mem::size_of::<SystemProcessorPerformanceInformation>();
    if buf.is_empty() || entry_size == 0 {
        return Err(Error::Platform("NtQuerySystemInformation returned no CPU data".into()));
    }

    let count = buf.len() / entry_size;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let offset = i * entry_size;
        let entry: SystemProcessorPerformanceInformation =
            unsafe { std::ptr::read_unaligned(buf[offset..offset + entry_size].as_ptr() as *const _) };
        out.push(entry);
    }
    Ok(out)
}

/// `KernelTime` reported by NT already includes idle time on every core,
/// so the synthetic record folds `user` into "used ticks" and leaves
/// `idle` as-is; this lets the platform-agnostic delta math in
/// `spectra-delta::step_cpu` run unmodified for Windows (§4.2 note).
pub fn read() -> Result<CpuSnapshotRaw> {
    let cores = read_per_core()?;
    let mut map = BTreeMap::new();
    for (i, c) in cores.iter().enumerate() {
        let used = (c.kernel_time + c.user_time - 2 * c.idle_time).max(0) as u64;
        map.insert(format!("cpu{i}"), CpuTimesRaw { user: used, idle: c.idle_time as u64, ..CpuTimesRaw::default() });
    }
    let aggregate = map.values().fold(CpuTimesRaw::default(), |mut acc, t| {
        acc.user += t.user;
        acc.idle += t.idle;
        acc
    });
    Ok(CpuSnapshotRaw { aggregate, cores: map })
}

/// Windows has no native load average (§4.2); the agent synthesizes one
/// from CPU usage via `spectra_delta::WindowsLoadEma` instead, so this
/// probe reports zeros rather than fabricate a sysctl-style reading.
pub fn read_load_average() -> Result<LoadAvgRaw> {
    Ok(LoadAvgRaw::default())
}
