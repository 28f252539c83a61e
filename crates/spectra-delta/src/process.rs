//! Per-process CPU% derivation (§4.2).

use crate::elapsed_is_usable;
use spectra_types::{ProcRaw, ProcessMetric, ProcessState, RawProcessState, percent};
use std::collections::HashMap;

/// The unit `ProcRaw::cpu_ticks` is expressed in, which varies by OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TicksPerSecond {
    /// Linux/FreeBSD `sysconf(_SC_CLK_TCK)`, falling back to 100 when the
    /// probe can't read it.
    ClockTicks(u64),
    /// FreeBSD process accounting reported in microseconds.
    Microseconds,
    /// Windows `FILETIME`-based CPU time, in 100ns units.
    Filetime100ns,
}

impl TicksPerSecond {
    fn denominator(self) -> f64 {
        match self {
            TicksPerSecond::ClockTicks(hz) => hz as f64,
            TicksPerSecond::Microseconds => 1_000_000.0,
            TicksPerSecond::Filetime100ns => 10_000_000.0,
        }
    }
}

impl Default for TicksPerSecond {
    fn default() -> Self {
        TicksPerSecond::ClockTicks(100)
    }
}

/// Per-pid baseline. The map is fully replaced every tick: a pid missing
/// from the current sample has exited and is never carried forward or
/// reported as a phantom zero (§4.2 "process map replacement").
#[derive(Debug, Clone, Default)]
pub struct ProcessDeltaState {
    previous: HashMap<i32, ProcRaw>,
}

impl ProcessDeltaState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `mem_total_bytes` is needed to compute `memory_percent`; it comes from
/// the same tick's memory probe read, not from process accounting.
pub fn step_process(
    state: &mut ProcessDeltaState,
    current: Vec<ProcRaw>,
    elapsed_seconds: f64,
    ticks_per_second: TicksPerSecond,
    mem_total_bytes: u64,
) -> Vec<ProcessMetric> {
    let mut next_state = HashMap::with_capacity(current.len());
    let mut out = Vec::with_capacity(current.len());

    for curr in current {
        let prev = state.previous.get(&curr.pid);

        let cpu_percent = match prev {
            Some(prev) if elapsed_is_usable(elapsed_seconds) && curr.cpu_ticks >= prev.cpu_ticks => {
                let delta_ticks = curr.cpu_ticks - prev.cpu_ticks;
                100.0 * delta_ticks as f64 / ticks_per_second.denominator() / elapsed_seconds
            }
            _ => 0.0,
        };

        let status = if curr.raw_state == RawProcessState::WindowsThreadDerived {
            classify_windows_state(curr.threads_running, curr.threads_runnable, curr.threads_waiting)
        } else {
            normalize_state(curr.raw_state)
        };

        out.push(ProcessMetric {
            pid: curr.pid,
            name: curr.name.clone(),
            status,
            rss_bytes: curr.rss_bytes,
            memory_percent: percent(curr.rss_bytes as f64, mem_total_bytes as f64),
            cpu_percent,
            num_threads: curr.num_threads,
            threads_running: thread_bucket(curr.raw_state, curr.threads_running),
            threads_runnable: thread_bucket(curr.raw_state, curr.threads_runnable),
            threads_waiting: thread_bucket(curr.raw_state, curr.threads_waiting),
        });

        next_state.insert(curr.pid, curr);
    }

    state.previous = next_state;
    out
}

/// Windows has no single process-state field; it is derived from the
/// aggregated thread states instead: any running thread ⇒ Running, else
/// any runnable ⇒ Runnable, else any waiting ⇒ Waiting, else Other
/// (§4.3.6).
fn classify_windows_state(running: u32, runnable: u32, waiting: u32) -> ProcessState {
    if running > 0 {
        ProcessState::Running
    } else if runnable > 0 {
        ProcessState::Runnable
    } else if waiting > 0 {
        ProcessState::Waiting
    } else {
        ProcessState::Other
    }
}

/// Thread-state breakdown is only meaningful where the probe actually
/// populates it (Linux and Windows); `Unknown` (a probe failure sentinel)
/// stays `None` rather than a misleading zero.
fn thread_bucket(state: RawProcessState, value: u32) -> Option<u32> {
    match state {
        RawProcessState::Unknown => None,
        _ => Some(value),
    }
}

fn normalize_state(raw: RawProcessState) -> ProcessState {
    match raw {
        RawProcessState::LinuxRunning | RawProcessState::FreeBsdRun => ProcessState::Running,
        RawProcessState::LinuxRunnableNoCpu => ProcessState::Runnable,
        RawProcessState::LinuxSleeping
        | RawProcessState::FreeBsdSleep
        | RawProcessState::FreeBsdIdle
        | RawProcessState::FreeBsdWait
        | RawProcessState::FreeBsdLock => ProcessState::Waiting,
        RawProcessState::LinuxStopped
        | RawProcessState::FreeBsdStop
        | RawProcessState::FreeBsdZombie
        | RawProcessState::WindowsThreadDerived
        | RawProcessState::Unknown => ProcessState::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: i32, ticks: u64) -> ProcRaw {
        ProcRaw {
            pid,
            name: "worker".into(),
            raw_state: RawProcessState::LinuxRunning,
            cpu_ticks: ticks,
            rss_bytes: 1024,
            num_threads: 4,
            threads_running: 1,
            threads_runnable: 0,
            threads_waiting: 3,
        }
    }

    #[test]
    fn first_sample_has_zero_cpu_percent() {
        let mut state = ProcessDeltaState::new();
        let out = step_process(&mut state, vec![proc(10, 500)], 1.0, TicksPerSecond::ClockTicks(100), 1_000_000);
        assert_eq!(out[0].cpu_percent, 0.0);
    }

    #[test]
    fn second_sample_computes_rate() {
        let mut state = ProcessDeltaState::new();
        step_process(&mut state, vec![proc(10, 500)], 1.0, TicksPerSecond::ClockTicks(100), 1_000_000);

        let out = step_process(&mut state, vec![proc(10, 600)], 1.0, TicksPerSecond::ClockTicks(100), 1_000_000);
        // 100 ticks / 100 Hz / 1s * 100 = 100% of one core.
        assert!((out[0].cpu_percent - 100.0).abs() < 0.01);
    }

    #[test]
    fn exited_pid_is_dropped_not_carried() {
        let mut state = ProcessDeltaState::new();
        step_process(&mut state, vec![proc(10, 500), proc(11, 10)], 1.0, TicksPerSecond::ClockTicks(100), 1_000_000);
        step_process(&mut state, vec![proc(10, 600)], 1.0, TicksPerSecond::ClockTicks(100), 1_000_000);
        assert!(!state.previous.contains_key(&11));
    }

    #[test]
    fn windows_thread_derived_status_follows_thread_aggregation() {
        let mut state = ProcessDeltaState::new();
        let mut p = proc(20, 100);
        p.raw_state = RawProcessState::WindowsThreadDerived;
        let out = step_process(&mut state, vec![p], 1.0, TicksPerSecond::Filetime100ns, 1_000_000);
        assert_eq!(out[0].threads_running, Some(1));
        assert_eq!(out[0].status, ProcessState::Running);
    }

    #[test]
    fn windows_thread_derived_falls_back_through_runnable_and_waiting() {
        assert_eq!(classify_windows_state(0, 1, 0), ProcessState::Runnable);
        assert_eq!(classify_windows_state(0, 0, 1), ProcessState::Waiting);
        assert_eq!(classify_windows_state(0, 0, 0), ProcessState::Other);
    }

    #[test]
    fn unknown_state_has_no_thread_breakdown() {
        let mut state = ProcessDeltaState::new();
        let mut p = proc(21, 100);
        p.raw_state = RawProcessState::Unknown;
        let out = step_process(&mut state, vec![p], 1.0, TicksPerSecond::Filetime100ns, 1_000_000);
        assert!(out[0].threads_running.is_none());
        assert_eq!(out[0].status, ProcessState::Other);
    }
}
