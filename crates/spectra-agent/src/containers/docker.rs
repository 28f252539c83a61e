//! Docker container enumeration and per-container stats fan-out (§4.3.7).

use super::docker_http::get_json;
use serde::Deserialize;
use spectra_types::{ContainerKind, ContainerMetric, ContainerSource, Metric, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

const DOCKER_SOCKET: &str = "/var/run/docker.sock";
const BOUNDED_CONCURRENCY: usize = 32;

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Debug, Default, Deserialize)]
struct CpuUsage {
    #[serde(default)]
    total_usage: u64,
    #[serde(default)]
    percpu_usage: Vec<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CpuStats {
    #[serde(default)]
    cpu_usage: CpuUsage,
    #[serde(default)]
    system_cpu_usage: u64,
    #[serde(default)]
    online_cpus: u32,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryInnerStats {
    #[serde(default)]
    inactive_file: u64,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    stats: MemoryInnerStats,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkStats {
    #[serde(default)]
    rx_bytes: u64,
    #[serde(default)]
    tx_bytes: u64,
}

#[derive(Debug, Default, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    cpu_stats: CpuStats,
    #[serde(default)]
    precpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
    #[serde(default)]
    networks: std::collections::HashMap<String, NetworkStats>,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Pid", default)]
    pid: i32,
}

#[derive(Debug, Deserialize)]
struct InspectResponse {
    #[serde(rename = "State")]
    state: Option<InspectState>,
}

/// Docker CPU% uses the delta between two samples embedded in the same
/// single-shot response (`cpu_stats` vs `precpu_stats`): `(Δtotal_usage /
/// Δsystem_cpu_usage) * online_cpus * 100`, falling back to the length of
/// `percpu_usage` when the daemon reports `online_cpus == 0`.
fn docker_cpu_percent(stats: &StatsResponse) -> f64 {
    let cpu_delta = stats.cpu_stats.cpu_usage.total_usage.saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats.cpu_stats.system_cpu_usage.saturating_sub(stats.precpu_stats.system_cpu_usage);
    if system_delta == 0 {
        return 0.0;
    }
    let online_cpus = if stats.cpu_stats.online_cpus > 0 {
        stats.cpu_stats.online_cpus as f64
    } else {
        stats.cpu_stats.cpu_usage.percpu_usage.len().max(1) as f64
    };
    (cpu_delta as f64 / system_delta as f64) * online_cpus * 100.0
}

/// `memory.usage` includes the page cache; subtracting `inactive_file`
/// reports working-set memory the way `docker stats` itself does. A
/// container with an unusual cgroup accounting can make the subtraction
/// go negative, in which case the raw usage is reported instead (§4.3.7).
fn docker_memory_used(stats: &StatsResponse) -> u64 {
    stats.memory_stats.usage.checked_sub(stats.memory_stats.stats.inactive_file).unwrap_or(stats.memory_stats.usage)
}

fn sum_network(stats: &StatsResponse) -> (u64, u64) {
    stats.networks.values().fold((0, 0), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes))
}

async fn fetch_one(summary: ContainerSummary) -> Option<Metric> {
    let stats_path = format!("/containers/{}/stats?stream=false", summary.id);
    let stats_json = get_json(DOCKER_SOCKET, &stats_path).await.ok()?;
    let stats: StatsResponse = serde_json::from_value(stats_json).ok()?;

    let cpu_limit_cores = fetch_cpu_limit(&summary.id).await;
    let (rx_bytes, tx_bytes) = sum_network(&stats);

    Some(Metric::Container(ContainerMetric {
        id: summary.id.chars().take(12).collect(),
        name: summary.names.first().map(|n| n.trim_start_matches('/').to_string()).unwrap_or(summary.id.clone()),
        image: summary.image,
        source: ContainerSource::Docker,
        kind: ContainerKind::Container,
        state: summary.state,
        cpu_percent: docker_cpu_percent(&stats),
        cpu_limit_cores,
        memory_used_bytes: docker_memory_used(&stats),
        memory_limit_bytes: stats.memory_stats.limit,
        rx_bytes,
        tx_bytes,
    }))
}

/// Docker's stats endpoint reports `online_cpus` (visible) but not a
/// configured `--cpus` limit; when the container was started with one,
/// it lives in the container's own cgroup, read by PID (§4.3.7
/// supplement).
async fn fetch_cpu_limit(container_id: &str) -> Option<f64> {
    let inspect_path = format!("/containers/{container_id}/json");
    let inspect_json = get_json(DOCKER_SOCKET, &inspect_path).await.ok()?;
    let inspect: InspectResponse = serde_json::from_value(inspect_json).ok()?;
    let pid = inspect.state?.pid;
    if pid <= 0 {
        return None;
    }
    spectra_quota::cpu_limit_cores(pid).ok().flatten()
}

/// Enumerates running containers and fans out per-container stats with
/// bounded concurrency (32). Docker not running degrades to "no
/// containers", not an error (§7); the bound is by count, not context
/// (§9 Open Question, resolved).
#[cfg(not(windows))]
pub async fn collect() -> Result<Vec<Metric>> {
    if !std::path::Path::new(DOCKER_SOCKET).exists() {
        return Ok(Vec::new());
    }

    let containers_json = match get_json(DOCKER_SOCKET, "/containers/json").await {
        Ok(v) => v,
        Err(_) => return Ok(Vec::new()),
    };
    let summaries: Vec<ContainerSummary> = match serde_json::from_value(containers_json) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("containers: failed to parse docker container list: {e}");
            return Ok(Vec::new());
        }
    };

    let semaphore = Arc::new(Semaphore::new(BOUNDED_CONCURRENCY));
    let mut handles = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            fetch_one(summary).await
        }));
    }

    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(Some(metric)) = handle.await {
            out.push(metric);
        }
    }
    Ok(out)
}

#[cfg(windows)]
pub async fn collect() -> Result<Vec<Metric>> {
    // Docker Desktop on Windows is reached through a named pipe, which
    // this agent doesn't speak.
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: u64, pretotal: u64, system: u64, presystem: u64, online: u32, percpu_len: usize) -> StatsResponse {
        StatsResponse {
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage { total_usage: total, percpu_usage: vec![0; percpu_len] },
                system_cpu_usage: system,
                online_cpus: online,
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage { total_usage: pretotal, percpu_usage: vec![] },
                system_cpu_usage: presystem,
                online_cpus: online,
            },
            memory_stats: MemoryStats::default(),
            networks: Default::default(),
        }
    }

    #[test]
    fn cpu_percent_matches_docker_formula() {
        // §8 scenario 4: cpu_total 100M->200M, system_cpu 900M->1000M, online=4.
        let s = stats(200_000_000, 100_000_000, 1_000_000_000, 900_000_000, 4, 4);
        assert!((docker_cpu_percent(&s) - 400.0).abs() < 0.01);
    }

    #[test]
    fn cpu_percent_falls_back_to_percpu_length_when_online_is_zero() {
        let s = stats(200_000_000, 100_000_000, 1_000_000_000, 900_000_000, 0, 2);
        assert!((docker_cpu_percent(&s) - 200.0).abs() < 0.01);
    }

    #[test]
    fn cpu_percent_zero_system_delta_is_zero_not_nan() {
        let s = stats(200, 100, 900, 900, 4, 1);
        assert_eq!(docker_cpu_percent(&s), 0.0);
    }

    #[test]
    fn memory_used_subtracts_inactive_file() {
        let mut s = stats(0, 0, 0, 0, 1, 1);
        s.memory_stats = MemoryStats { usage: 1000, limit: 2000, stats: MemoryInnerStats { inactive_file: 300 } };
        assert_eq!(docker_memory_used(&s), 700);
    }

    #[test]
    fn memory_used_falls_back_to_raw_usage_when_subtraction_goes_negative() {
        let mut s = stats(0, 0, 0, 0, 1, 1);
        s.memory_stats = MemoryStats { usage: 100, limit: 2000, stats: MemoryInnerStats { inactive_file: 300 } };
        assert_eq!(docker_memory_used(&s), 100);
    }

    #[test]
    fn network_bytes_are_summed_across_interfaces() {
        let mut s = stats(0, 0, 0, 0, 1, 1);
        s.networks.insert("eth0".into(), NetworkStats { rx_bytes: 100, tx_bytes: 50 });
        s.networks.insert("eth1".into(), NetworkStats { rx_bytes: 200, tx_bytes: 75 });
        assert_eq!(sum_network(&s), (300, 125));
    }
}
