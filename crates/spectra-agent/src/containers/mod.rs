//! Container/guest metrics: Docker and Proxmox, fanned out concurrently (§4.3.7).

mod docker;
mod docker_http;
mod proxmox;

use spectra_types::{Error, Metric};

/// Runs both sources concurrently; either degrading to empty is not an
/// error for the other (§7 "containers collector degrades per source").
pub async fn collect() -> Result<Vec<Metric>, Error> {
    let (docker_result, proxmox_result) = tokio::join!(docker::collect(), proxmox::collect());

    let mut metrics = Vec::new();
    match docker_result {
        Ok(m) => metrics.extend(m),
        Err(e) => log::warn!("containers: docker collection failed: {e}"),
    }
    match proxmox_result {
        Ok(m) => metrics.extend(m),
        Err(e) => log::warn!("containers: proxmox collection failed: {e}"),
    }

    Ok(metrics)
}
