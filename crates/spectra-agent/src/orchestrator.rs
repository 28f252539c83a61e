//! Builds the platform probe set and launches every collector task (§4.5).
//!
//! Startup order matters: the drive cache exists and is populated before
//! the disk collectors can produce anything meaningful, so the mount
//! manager is spawned first and everyone else is spawned after.

use crate::collector::{self, AsyncCollectFn, CollectFn};
use crate::containers;
use log::warn;
use spectra_delta::{
    CpuDeltaState, DiskIoDeltaState, NetworkDeltaState, ProcessDeltaState, TicksPerSecond,
    WindowsLoadEma, build_cpu_metric, step_cpu, step_disk_io, step_network, step_process,
};
use spectra_types::{Envelope, Metric, MemoryMetric, PlatformProbes, percent};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::Sender;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

const MOUNT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

const CPU_INTERVAL: Duration = Duration::from_secs(5);
const MEMORY_INTERVAL: Duration = Duration::from_secs(10);
const DISK_INTERVAL: Duration = Duration::from_secs(60);
const DISK_IO_INTERVAL: Duration = Duration::from_secs(5);
const NETWORK_INTERVAL: Duration = Duration::from_secs(5);
const PROCESS_INTERVAL: Duration = Duration::from_secs(15);
const SERVICE_INTERVAL: Duration = Duration::from_secs(60);
const TEMPERATURE_INTERVAL: Duration = Duration::from_secs(10);
const WIFI_INTERVAL: Duration = Duration::from_secs(30);
const CONTAINERS_INTERVAL: Duration = Duration::from_secs(60);
const SYSTEM_INTERVAL: Duration = Duration::from_secs(300);
const UPDATES_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Wall-clock time since this closure's last tick; 0.0 (treated as
/// "unusable") on the very first call so every delta stepper takes its
/// baseline path instead of dividing by a bogus elapsed time.
fn tick_elapsed(last: &mut Option<Instant>) -> f64 {
    let now = Instant::now();
    let elapsed = last.map(|t| now.duration_since(t).as_secs_f64()).unwrap_or(0.0);
    *last = Some(now);
    elapsed
}

#[cfg(target_os = "linux")]
fn ticks_per_second() -> TicksPerSecond {
    TicksPerSecond::ClockTicks(spectra_platform::linux_clk_tck())
}

#[cfg(target_os = "freebsd")]
fn ticks_per_second() -> TicksPerSecond {
    TicksPerSecond::Microseconds
}

#[cfg(windows)]
fn ticks_per_second() -> TicksPerSecond {
    TicksPerSecond::Filetime100ns
}

/// Launches the mount cache's periodic refresh, the drive/mount
/// dependent disk collectors, and every other signal's collector, and
/// blocks until `cancel` fires and they've all wound down.
pub async fn run(
    probes: Box<dyn PlatformProbes>,
    hostname: String,
    tx: Sender<Envelope>,
    cancel: CancellationToken,
) {
    let probes: Arc<dyn PlatformProbes> = Arc::from(probes);
    let mem_total_bytes = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    #[cfg(not(windows))]
    let drive_cache = Arc::new(spectra_cache::DriveCache::new());
    #[cfg(not(windows))]
    handles.push(tokio::spawn(run_mount_manager(probes.clone(), drive_cache.clone(), cancel.clone())));

    #[cfg(windows)]
    let drive_cache = Arc::new(spectra_cache::DriveCache::new());
    #[cfg(windows)]
    handles.push(tokio::spawn(run_windows_drive_cache_manager(probes.clone(), drive_cache.clone(), cancel.clone())));

    handles.push(tokio::spawn(collector::run(
        "cpu",
        CPU_INTERVAL,
        make_cpu_collector(probes.clone()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "memory",
        MEMORY_INTERVAL,
        make_memory_collector(probes.clone(), mem_total_bytes.clone()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));

    #[cfg(not(windows))]
    {
        handles.push(tokio::spawn(collector::run(
            "disk",
            DISK_INTERVAL,
            make_disk_usage_collector(probes.clone(), drive_cache.clone()),
            tx.clone(),
            hostname.clone(),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(collector::run(
            "disk_io",
            DISK_IO_INTERVAL,
            make_disk_io_collector(probes.clone(), drive_cache.clone()),
            tx.clone(),
            hostname.clone(),
            cancel.clone(),
        )));
    }
    #[cfg(windows)]
    {
        handles.push(tokio::spawn(collector::run(
            "disk",
            DISK_INTERVAL,
            make_disk_usage_collector_windows(probes.clone(), drive_cache.clone()),
            tx.clone(),
            hostname.clone(),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(collector::run(
            "disk_io",
            DISK_IO_INTERVAL,
            make_disk_io_collector_windows(probes.clone(), drive_cache.clone()),
            tx.clone(),
            hostname.clone(),
            cancel.clone(),
        )));
    }

    handles.push(tokio::spawn(collector::run(
        "network",
        NETWORK_INTERVAL,
        make_network_collector(probes.clone()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "process",
        PROCESS_INTERVAL,
        make_process_collector(probes.clone(), mem_total_bytes.clone()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "service",
        SERVICE_INTERVAL,
        make_delegating_collector(probes.clone(), |p| p.service().list()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "temperature",
        TEMPERATURE_INTERVAL,
        make_delegating_collector(probes.clone(), |p| p.temperature().read()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "wifi",
        WIFI_INTERVAL,
        make_delegating_collector(probes.clone(), |p| p.wifi().read()),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "system",
        SYSTEM_INTERVAL,
        make_delegating_collector(probes.clone(), |p| p.system().read().map(|m| vec![m])),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(collector::run(
        "updates",
        UPDATES_INTERVAL,
        make_delegating_collector(probes.clone(), |p| p.updates().read().map(|m| vec![m])),
        tx.clone(),
        hostname.clone(),
        cancel.clone(),
    )));

    let containers_collect: AsyncCollectFn = Box::new(|| Box::pin(containers::collect()));
    handles.push(tokio::spawn(collector::run_async(
        "containers",
        CONTAINERS_INTERVAL,
        containers_collect,
        tx,
        hostname,
        cancel,
    )));

    for handle in handles {
        let _ = handle.await;
    }
}

#[cfg(not(windows))]
async fn run_mount_manager(
    probes: Arc<dyn PlatformProbes>,
    cache: Arc<spectra_cache::DriveCache>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(MOUNT_REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let probes = probes.clone();
        match tokio::task::spawn_blocking(move || probes.disk().list_mounts()).await {
            Ok(Ok(mounts)) => cache.refresh(mounts),
            Ok(Err(e)) => warn!("mount manager: list_mounts failed: {e}"),
            Err(_) => warn!("mount manager: blocking task panicked"),
        }
    }
}

#[cfg(windows)]
async fn run_windows_drive_cache_manager(
    probes: Arc<dyn PlatformProbes>,
    cache: Arc<spectra_cache::DriveCache>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(MOUNT_REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let probes = probes.clone();
        match tokio::task::spawn_blocking(move || {
            let disks = probes.disk().list_physical_disks()?;
            let drive_letters = probes.disk().drive_letters_by_physical_index()?;
            Ok::<_, spectra_types::Error>((disks, drive_letters))
        })
        .await
        {
            Ok(Ok((disks, drive_letters))) => cache.refresh(disks, drive_letters),
            Ok(Err(e)) => warn!("drive cache manager: refresh failed: {e}"),
            Err(_) => warn!("drive cache manager: blocking task panicked"),
        }
    }
}

/// Wraps a `PlatformProbes -> Result<Vec<Metric>>` call with no delta
/// state of its own; covers services, temperature, wifi, and the two
/// single-`Metric` probes once mapped into a one-element vec.
fn make_delegating_collector(
    probes: Arc<dyn PlatformProbes>,
    read: fn(&dyn PlatformProbes) -> spectra_types::Result<Vec<Metric>>,
) -> CollectFn {
    Box::new(move || read(probes.as_ref()))
}

fn make_cpu_collector(probes: Arc<dyn PlatformProbes>) -> CollectFn {
    let mut state = CpuDeltaState::new();
    let mut windows_load = WindowsLoadEma::new();
    let mut last = None;
    Box::new(move || {
        let elapsed = tick_elapsed(&mut last);
        let snapshot = probes.cpu().read()?;
        let Some((overall, per_core)) = step_cpu(&mut state, snapshot, elapsed) else {
            return Ok(Vec::new());
        };

        let (load_1, load_5, load_15) = if cfg!(windows) {
            windows_load.step(overall, elapsed);
            (windows_load.load_1min, windows_load.load_5min, windows_load.load_15min)
        } else {
            let load = probes.cpu().read_load_average()?;
            (load.load_1min, load.load_5min, load.load_15min)
        };

        Ok(vec![Metric::Cpu(build_cpu_metric(overall, per_core, load_1, load_5, load_15))])
    })
}

fn make_memory_collector(probes: Arc<dyn PlatformProbes>, mem_total_bytes: Arc<AtomicU64>) -> CollectFn {
    Box::new(move || {
        let raw = probes.memory().read()?;
        mem_total_bytes.store(raw.total_bytes, Ordering::Relaxed);

        let used_bytes = raw.total_bytes.saturating_sub(raw.available_bytes);
        let swap_used_bytes = raw.swap_total_bytes.saturating_sub(raw.swap_free_bytes);

        Ok(vec![Metric::Memory(MemoryMetric {
            total_bytes: raw.total_bytes,
            used_bytes,
            available_bytes: raw.available_bytes,
            used_percent: percent(used_bytes as f64, raw.total_bytes as f64),
            swap_total_bytes: raw.swap_total_bytes,
            swap_used_bytes,
            swap_percent: percent(swap_used_bytes as f64, raw.swap_total_bytes as f64),
        })])
    })
}

#[cfg(not(windows))]
fn make_disk_usage_collector(
    probes: Arc<dyn PlatformProbes>,
    cache: Arc<spectra_cache::DriveCache>,
) -> CollectFn {
    Box::new(move || {
        let mut out = Vec::new();
        for mount in cache.snapshot() {
            match probes.disk().read_usage(&mount) {
                Ok(metric) => out.push(metric),
                Err(e) => warn!("disk: read_usage({}) failed: {e}", mount.mount_point),
            }
        }
        Ok(out)
    })
}

#[cfg(not(windows))]
fn make_disk_io_collector(
    probes: Arc<dyn PlatformProbes>,
    cache: Arc<spectra_cache::DriveCache>,
) -> CollectFn {
    let mut state = DiskIoDeltaState::new();
    let mut last = None;
    Box::new(move || {
        let elapsed = tick_elapsed(&mut last);
        let raw = probes.disk().read_io()?;
        let matched: Vec<_> = raw.into_iter().filter(|d| cache.get(&d.device).is_some()).collect();
        let metrics = step_disk_io(&mut state, matched, elapsed);
        Ok(metrics.into_iter().map(Metric::DiskIo).collect())
    })
}

/// Drops mounts whose drive letter isn't backed by a physical disk the
/// cache kept (USB/virtual disks excluded, see `spectra-cache::windows`).
#[cfg(windows)]
fn make_disk_usage_collector_windows(
    probes: Arc<dyn PlatformProbes>,
    cache: Arc<spectra_cache::DriveCache>,
) -> CollectFn {
    Box::new(move || {
        let allowed: std::collections::HashSet<String> = cache
            .disks()
            .into_iter()
            .flat_map(|d| cache.drive_letters_for(d.index))
            .collect();

        let mut out = Vec::new();
        for mount in probes.disk().list_mounts()? {
            if !allowed.contains(&mount.device) {
                continue;
            }
            match probes.disk().read_usage(&mount) {
                Ok(metric) => out.push(metric),
                Err(e) => warn!("disk: read_usage({}) failed: {e}", mount.mount_point),
            }
        }
        Ok(out)
    })
}

/// Drops I/O counters for physical disks the cache excluded.
#[cfg(windows)]
fn make_disk_io_collector_windows(
    probes: Arc<dyn PlatformProbes>,
    cache: Arc<spectra_cache::DriveCache>,
) -> CollectFn {
    let mut state = DiskIoDeltaState::new();
    let mut last = None;
    Box::new(move || {
        let elapsed = tick_elapsed(&mut last);
        let allowed: std::collections::HashSet<u32> = cache.disks().into_iter().map(|d| d.index).collect();
        let raw: Vec<_> = probes
            .disk()
            .read_io()?
            .into_iter()
            .filter(|d| d.device.strip_prefix("PhysicalDrive").and_then(|n| n.parse::<u32>().ok()).is_some_and(|i| allowed.contains(&i)))
            .collect();
        let metrics = step_disk_io(&mut state, raw, elapsed);
        Ok(metrics.into_iter().map(Metric::DiskIo).collect())
    })
}

fn make_network_collector(probes: Arc<dyn PlatformProbes>) -> CollectFn {
    let mut state = NetworkDeltaState::new();
    let mut last = None;
    Box::new(move || {
        let elapsed = tick_elapsed(&mut last);
        let ifaces = probes.network().read_interfaces()?;
        let metrics = step_network(&mut state, ifaces, elapsed);
        Ok(metrics.into_iter().map(Metric::Network).collect())
    })
}

fn make_process_collector(probes: Arc<dyn PlatformProbes>, mem_total_bytes: Arc<AtomicU64>) -> CollectFn {
    let mut state = ProcessDeltaState::new();
    let mut last = None;
    let ticks = ticks_per_second();
    Box::new(move || {
        let elapsed = tick_elapsed(&mut last);
        let procs = probes.process().list()?;
        let mem_total = mem_total_bytes.load(Ordering::Relaxed);
        let metrics = step_process(&mut state, procs, elapsed, ticks, mem_total);
        Ok(metrics.into_iter().map(Metric::Process).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_elapsed_is_zero_on_first_call() {
        let mut last = None;
        assert_eq!(tick_elapsed(&mut last), 0.0);
        assert!(last.is_some());
    }

    #[test]
    fn tick_elapsed_measures_gap_on_second_call() {
        let mut last = None;
        tick_elapsed(&mut last);
        std::thread::sleep(Duration::from_millis(20));
        let elapsed = tick_elapsed(&mut last);
        assert!(elapsed > 0.0);
    }
}
