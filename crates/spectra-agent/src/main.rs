//! `spectrad` — the Spectra collection agent binary (§4, §6).
//!
//! Startup: read config, register this host once, then hand off to the
//! orchestrator until a shutdown signal cancels everything.

mod collector;
mod config;
mod containers;
mod orchestrator;
mod sender;

use config::Config;
use log::{error, info};
use sender::{DEFAULT_MAX_BATCH, Sender};
use spectra_types::Envelope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    info!("spectrad starting: server={} hostname={}", config.server, config.hostname);

    let probes = spectra_platform::new_platform_probes();
    register(&config, probes.as_ref()).await;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<Envelope>(DEFAULT_MAX_BATCH * 4);

    let sender = Sender::new(&config.server);
    let sender_cancel = cancel.clone();
    let sender_handle = tokio::spawn(async move { sender.run(rx, sender_cancel).await });

    let orchestrator_cancel = cancel.clone();
    let hostname = config.hostname.clone();
    let orchestrator_handle =
        tokio::spawn(async move { orchestrator::run(probes, hostname, tx, orchestrator_cancel).await });

    wait_for_shutdown_signal().await;
    info!("spectrad: shutdown signal received, draining");
    cancel.cancel();

    let _ = orchestrator_handle.await;
    let _ = sender_handle.await;
    info!("spectrad: stopped");
}

/// One-shot `HostInfo` registration before the collector loop starts
/// (§6 "Registration"). A failure here is logged, not fatal: the server
/// may simply not be up yet, and metrics still flow once it is.
async fn register(config: &Config, probes: &dyn spectra_types::PlatformProbes) {
    let host_info = match probes.system().read_host_info() {
        Ok(spectra_types::Metric::HostInfo(info)) => info,
        Ok(_) => {
            error!("register: system probe returned the wrong metric kind");
            return;
        }
        Err(e) => {
            error!("register: failed to read host info: {e}");
            return;
        }
    };

    let url = format!("{}/api/v1/agent/register", config.server.trim_end_matches('/'));
    let client = reqwest::Client::new();
    match client.post(&url).json(&host_info).send().await {
        Ok(resp) if resp.status().is_success() => info!("register: host registered"),
        Ok(resp) => error!("register: server returned {}", resp.status()),
        Err(e) => error!("register: request failed: {e}"),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(windows)]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
