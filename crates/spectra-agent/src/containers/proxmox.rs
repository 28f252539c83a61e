//! Proxmox VE guest enumeration via the `pvesh` CLI (§4.3.7).
//!
//! Proxmox ships no client library the agent can link against; its own
//! documented automation surface is the `pvesh` command shipped on every
//! node, so guest status is read the same way the node's own tooling
//! does: shell out and parse JSON, exactly as `spectra-platform::bsd`
//! shells out to `hostname` for a value with no clean syscall.

use serde::Deserialize;
use spectra_types::{ContainerKind, ContainerMetric, ContainerSource, Metric, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::timeout;

const BOUNDED_CONCURRENCY: usize = 32;
const CLUSTER_RPC_TIMEOUT: Duration = Duration::from_secs(5);
const GUEST_RPC_TIMEOUT: Duration = Duration::from_secs(2);

static NODE_NAME: OnceCell<Option<String>> = OnceCell::const_new();

#[derive(Debug, Deserialize)]
struct ClusterResource {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    vmid: Option<u64>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GuestStatus {
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    maxcpu: f64,
    #[serde(default)]
    mem: u64,
    #[serde(default)]
    maxmem: u64,
    #[serde(default)]
    netin: u64,
    #[serde(default)]
    netout: u64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    name: String,
}

async fn run_pvesh(args: &[&str], rpc_timeout: Duration) -> Option<serde_json::Value> {
    let mut command = Command::new("pvesh");
    command.args(args).arg("--output-format").arg("json");
    let output = timeout(rpc_timeout, command.output()).await.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

/// The local node's name, resolved once via `hostname` and cached for the
/// lifetime of the process; every `pvesh` guest-status call is scoped to
/// `nodes/<name>/...`.
async fn local_node_name() -> Option<String> {
    NODE_NAME
        .get_or_init(|| async {
            let output = timeout(CLUSTER_RPC_TIMEOUT, Command::new("hostname").output()).await.ok()?.ok()?;
            if !output.status.success() {
                return None;
            }
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if name.is_empty() { None } else { Some(name) }
        })
        .await
        .clone()
}

fn guest_endpoint(node: &str, kind: &str, vmid: u64) -> String {
    let path_kind = if kind == "lxc" { "lxc" } else { "qemu" };
    format!("nodes/{node}/{path_kind}/{vmid}/status/current")
}

async fn fetch_one(node: String, resource: ClusterResource) -> Option<Metric> {
    let vmid = resource.vmid?;
    let endpoint = guest_endpoint(&node, &resource.kind, vmid);
    let json = run_pvesh(&["get", &endpoint], GUEST_RPC_TIMEOUT).await?;
    let status: GuestStatus = serde_json::from_value(json).ok()?;

    let kind = if resource.kind == "lxc" { ContainerKind::Lxc } else { ContainerKind::Vm };
    // Proxmox CPU% is fraction-of-one-core; scaled by the guest's own
    // vCPU count it can legitimately exceed 100% under burst, and the
    // resolved Open Question keeps it unclamped rather than capping it.
    let cpu_percent = status.cpu * status.maxcpu.max(1.0) * 100.0;

    Some(Metric::Container(ContainerMetric {
        id: vmid.to_string(),
        name: if status.name.is_empty() { resource.name.unwrap_or_else(|| vmid.to_string()) } else { status.name },
        image: String::new(),
        source: ContainerSource::Proxmox,
        kind,
        state: if status.status.is_empty() { resource.status.unwrap_or_default() } else { status.status },
        cpu_percent,
        cpu_limit_cores: if status.maxcpu > 0.0 { Some(status.maxcpu) } else { None },
        memory_used_bytes: status.mem,
        memory_limit_bytes: status.maxmem,
        rx_bytes: status.netin,
        tx_bytes: status.netout,
    }))
}

/// Degrades to "no guests" (not an error) when `pvesh` isn't in PATH,
/// since most hosts running this agent aren't Proxmox nodes at all (§7).
#[cfg(not(windows))]
pub async fn collect() -> Result<Vec<Metric>> {
    let Some(node) = local_node_name().await else {
        return Ok(Vec::new());
    };

    let Some(json) = run_pvesh(&["get", "/cluster/resources", "--type", "vm"], CLUSTER_RPC_TIMEOUT).await else {
        return Ok(Vec::new());
    };
    let resources: Vec<ClusterResource> = match serde_json::from_value(json) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("containers: failed to parse pvesh cluster resource list: {e}");
            return Ok(Vec::new());
        }
    };
    let resources: Vec<_> = resources
        .into_iter()
        .filter(|r| r.kind == "qemu" || r.kind == "lxc")
        .filter(|r| r.node.as_deref().is_none_or(|n| n == node))
        .collect();

    let semaphore = Arc::new(Semaphore::new(BOUNDED_CONCURRENCY));
    let mut handles = Vec::with_capacity(resources.len());
    for resource in resources {
        let semaphore = semaphore.clone();
        let node = node.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            fetch_one(node, resource).await
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
    // pvesh is a Proxmox-node-only tool; never present on Windows.
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_endpoint_picks_lxc_or_qemu_path() {
        assert_eq!(guest_endpoint("pve1", "lxc", 101), "nodes/pve1/lxc/101/status/current");
        assert_eq!(guest_endpoint("pve1", "qemu", 102), "nodes/pve1/qemu/102/status/current");
    }

    #[test]
    fn cpu_percent_is_fraction_times_vcpus_times_100_unclamped() {
        let status = GuestStatus { cpu: 1.2, maxcpu: 4.0, ..GuestStatus::default() };
        let cpu_percent = status.cpu * status.maxcpu.max(1.0) * 100.0;
        assert!((cpu_percent - 480.0).abs() < 0.01);
        assert!(cpu_percent > 100.0, "must not be clamped per the resolved Open Question");
    }

    #[test]
    fn cpu_percent_defaults_maxcpu_to_one_core() {
        let status = GuestStatus { cpu: 0.5, maxcpu: 0.0, ..GuestStatus::default() };
        let cpu_percent = status.cpu * status.maxcpu.max(1.0) * 100.0;
        assert!((cpu_percent - 50.0).abs() < 0.01);
    }
}
