//! Batches envelopes into gzip-compressed JSON and POSTs them (§4.6).
//!
//! `reqwest` is the pack's dominant async HTTP client; its own `gzip`
//! feature only decompresses responses, so the request body is compressed
//! by hand with `flate2` before the POST.

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{error, warn};
use spectra_types::Envelope;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_BATCH: usize = 50;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Sender {
    client: reqwest::Client,
    metrics_url: String,
}

impl Sender {
    pub fn new(server: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, metrics_url: build_metrics_url(server) }
    }

    /// Drains `rx` until it closes or `cancel` fires, flushing on count,
    /// on a timer, or as a final drain on shutdown (§4.6 flush triggers).
    pub async fn run(&self, mut rx: Receiver<Envelope>, cancel: CancellationToken) {
        let mut batch = Vec::with_capacity(DEFAULT_MAX_BATCH);
        let mut ticker = interval(DEFAULT_FLUSH_INTERVAL);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.flush(std::mem::take(&mut batch)).await;
                    return;
                }
                maybe_envelope = rx.recv() => {
                    match maybe_envelope {
                        Some(envelope) => {
                            batch.push(envelope);
                            if batch.len() >= DEFAULT_MAX_BATCH {
                                self.flush(std::mem::take(&mut batch)).await;
                            }
                        }
                        None => {
                            self.flush(std::mem::take(&mut batch)).await;
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(std::mem::take(&mut batch)).await;
                    }
                }
            }
        }
    }

    /// On non-2xx or a transport error the batch is logged and dropped:
    /// no persistent queue, at-most-once semantics (§4.6, §7).
    async fn flush(&self, batch: Vec<Envelope>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();

        let body = match serde_json::to_vec(&batch) {
            Ok(b) => b,
            Err(e) => {
                error!("sender: failed to serialize batch of {count}: {e}");
                return;
            }
        };
        let compressed = match gzip(&body) {
            Ok(c) => c,
            Err(e) => {
                error!("sender: failed to gzip batch of {count}: {e}");
                return;
            }
        };

        let result = self
            .client
            .post(&self.metrics_url)
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip")
            .body(compressed)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!("sender: server returned {}, dropping batch of {count}", resp.status()),
            Err(e) => warn!("sender: send failed, dropping batch of {count}: {e}"),
        }
    }
}

fn build_metrics_url(server: &str) -> String {
    format!("{}/api/v1/metrics", server.trim_end_matches('/'))
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn metrics_url_strips_trailing_slash() {
        assert_eq!(build_metrics_url("http://host:8080/"), "http://host:8080/api/v1/metrics");
        assert_eq!(build_metrics_url("http://host:8080"), "http://host:8080/api/v1/metrics");
    }

    #[test]
    fn gzip_round_trips() {
        let original = b"[{\"type\":\"cpu\"}]".to_vec();
        let compressed = gzip(&original).unwrap();
        assert_ne!(compressed, original);

        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[tokio::test]
    async fn run_drains_and_flushes_on_cancel_without_panicking() {
        use chrono::Utc;
        use spectra_types::{Metric, SystemMetric};
        use tokio::sync::mpsc;

        let (tx, rx) = mpsc::channel(4);
        let sender = Sender::new("http://127.0.0.1:1");
        let cancel = CancellationToken::new();

        tx.send(Envelope::new(
            "host",
            Utc::now(),
            Metric::System(SystemMetric {
                uptime_seconds: 1,
                boot_time_unix: 0,
                process_count: 1,
                logged_in_users: 0,
            }),
        ))
        .await
        .unwrap();
        drop(tx);

        // Nothing is actually listening on 127.0.0.1:1; the point is that
        // a send failure is absorbed, not that this reaches a server.
        sender.run(rx, cancel).await;
    }
}
