//! Disk I/O rate derivation (§4.2).

use crate::elapsed_is_usable;
use spectra_types::{DiskIoMetric, DiskIoRaw};
use std::collections::HashMap;

/// Per-device baseline, keyed by device name (e.g. `sda`, `nvme0n1`).
#[derive(Debug, Clone, Default)]
pub struct DiskIoDeltaState {
    previous: HashMap<String, DiskIoRaw>,
}

impl DiskIoDeltaState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One step over every device present in `current`. Devices missing from
/// `current` (unplugged, or a loop/ram device that stopped appearing) are
/// dropped from state rather than carried forward (§4.2 "no ghost
/// devices"). A device seen for the first time stores its baseline and
/// emits nothing for this tick.
pub fn step_disk_io(
    state: &mut DiskIoDeltaState,
    current: Vec<DiskIoRaw>,
    elapsed_seconds: f64,
) -> Vec<DiskIoMetric> {
    let mut next_state = HashMap::with_capacity(current.len());
    let mut out = Vec::new();

    for curr in current {
        let prev = state.previous.get(&curr.device);

        if elapsed_is_usable(elapsed_seconds)
            && let Some(prev) = prev
            && is_monotonic(prev, &curr)
        {
            out.push(DiskIoMetric {
                device: curr.device.clone(),
                read_bytes_per_sec: rate(curr.read_bytes - prev.read_bytes, elapsed_seconds),
                write_bytes_per_sec: rate(curr.write_bytes - prev.write_bytes, elapsed_seconds),
                read_ops_per_sec: rate(curr.read_ops - prev.read_ops, elapsed_seconds),
                write_ops_per_sec: rate(curr.write_ops - prev.write_ops, elapsed_seconds),
                read_time_ms: curr.read_time_ms.saturating_sub(prev.read_time_ms),
                write_time_ms: curr.write_time_ms.saturating_sub(prev.write_time_ms),
                queue_depth: curr.io_in_progress,
            });
        }

        next_state.insert(curr.device.clone(), curr);
    }

    state.previous = next_state;
    out
}

fn is_monotonic(prev: &DiskIoRaw, curr: &DiskIoRaw) -> bool {
    curr.read_bytes >= prev.read_bytes
        && curr.write_bytes >= prev.write_bytes
        && curr.read_ops >= prev.read_ops
        && curr.write_ops >= prev.write_ops
        && curr.read_time_ms >= prev.read_time_ms
        && curr.write_time_ms >= prev.write_time_ms
}

fn rate(delta: u64, elapsed_seconds: f64) -> f64 {
    delta as f64 / elapsed_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(device: &str, read_bytes: u64, write_bytes: u64) -> DiskIoRaw {
        DiskIoRaw {
            device: device.into(),
            read_bytes,
            write_bytes,
            read_ops: read_bytes / 512,
            write_ops: write_bytes / 512,
            read_time_ms: 10,
            write_time_ms: 20,
            io_in_progress: 0,
        }
    }

    #[test]
    fn first_sample_is_baseline_only() {
        let mut state = DiskIoDeltaState::new();
        let out = step_disk_io(&mut state, vec![sample("sda", 1000, 2000)], 1.0);
        assert!(out.is_empty());
        assert_eq!(state.previous.len(), 1);
    }

    #[test]
    fn second_sample_emits_rate() {
        let mut state = DiskIoDeltaState::new();
        step_disk_io(&mut state, vec![sample("sda", 1000, 2000)], 1.0);

        let out = step_disk_io(&mut state, vec![sample("sda", 6000, 7000)], 2.0);
        assert_eq!(out.len(), 1);
        assert!((out[0].read_bytes_per_sec - 2500.0).abs() < 0.01);
        assert!((out[0].write_bytes_per_sec - 2500.0).abs() < 0.01);
    }

    #[test]
    fn disappearing_device_is_dropped_not_carried() {
        let mut state = DiskIoDeltaState::new();
        step_disk_io(&mut state, vec![sample("sda", 1000, 2000), sample("sdb", 1, 1)], 1.0);
        step_disk_io(&mut state, vec![sample("sda", 2000, 3000)], 1.0);
        assert!(!state.previous.contains_key("sdb"));
    }

    #[test]
    fn counter_reset_drops_this_tick_and_rebaselines() {
        let mut state = DiskIoDeltaState::new();
        step_disk_io(&mut state, vec![sample("sda", 100_000, 100_000)], 1.0);

        let out = step_disk_io(&mut state, vec![sample("sda", 10, 10)], 1.0);
        assert!(out.is_empty());
        assert_eq!(state.previous.get("sda").unwrap().read_bytes, 10);
    }
}
