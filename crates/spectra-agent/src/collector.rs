//! The periodic collector task (§4.1).
//!
//! Structured the way `otap-dataflow`'s pipeline stages run their own
//! `tokio::time::interval` loop: tick, collect, log-and-continue on error,
//! never let one bad tick stop the loop. Unlike that example, the probe
//! call itself is synchronous and platform-specific, so it runs inside
//! `spawn_blocking` with a panic guard around it instead of being `async`
//! all the way down.

use chrono::Utc;
use log::error;
use spectra_types::{Envelope, Error, Metric};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use tokio::sync::mpsc::Sender;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// One tick's worth of probe + delta-state work, owning whatever baseline
/// state it needs in its closure (§4.1 "the runner itself is stateless").
pub type CollectFn = Box<dyn FnMut() -> Result<Vec<Metric>, Error> + Send + 'static>;

/// Same contract as `CollectFn` but for a collector whose own work is
/// inherently async I/O (the containers collector talks to a Unix socket
/// and shells out to a CLI), rather than a blocking local syscall.
pub type AsyncCollectFn =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<Metric>, Error>> + Send>> + Send + 'static>;

/// Runs `collect` on `interval_duration`, immediately then on the timer,
/// pushing resulting envelopes to `tx` until `cancel` fires.
pub async fn run(
    name: &'static str,
    interval_duration: Duration,
    mut collect: CollectFn,
    tx: Sender<Envelope>,
    hostname: String,
    cancel: CancellationToken,
) {
    let mut ticker = interval(interval_duration);
    // A missed tick (slow probe) should not cause a burst of catch-up
    // ticks; skip straight to the next scheduled one.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::task::spawn_blocking(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| collect()));
            (collect, result)
        })
        .await;

        let Ok((returned_collect, result)) = outcome else {
            error!("collector {name}: blocking task join failed, stopping");
            return;
        };
        collect = returned_collect;

        let metrics = match result {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                error!("collector {name}: probe failed: {e}");
                continue;
            }
            Err(_) => {
                error!("collector {name}: probe panicked");
                continue;
            }
        };

        // Baseline suppression: an empty Ok means "no derived value yet",
        // not an error, and produces no envelopes.
        let now = Utc::now();
        for metric in metrics {
            let envelope = Envelope::new(hostname.clone(), now, metric);
            tokio::select! {
                _ = cancel.cancelled() => return,
                send_result = tx.send(envelope) => {
                    if send_result.is_err() {
                        // Sender side dropped the channel; nothing more to do.
                        return;
                    }
                }
            }
        }
    }
}

/// Variant of `run` for an async collector. There's no `spawn_blocking`
/// or `catch_unwind` here: the containers collector's own fan-out already
/// isolates a failing container/guest to its own task (§4.3.7), so a
/// panic there can't take the whole tick down the way a probe panic
/// could on the synchronous path.
pub async fn run_async(
    name: &'static str,
    interval_duration: Duration,
    collect: AsyncCollectFn,
    tx: Sender<Envelope>,
    hostname: String,
    cancel: CancellationToken,
) {
    let mut ticker = interval(interval_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let metrics = match collect().await {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("collector {name}: probe failed: {e}");
                continue;
            }
        };

        let now = Utc::now();
        for metric in metrics {
            let envelope = Envelope::new(hostname.clone(), now, metric);
            tokio::select! {
                _ = cancel.cancelled() => return,
                send_result = tx.send(envelope) => {
                    if send_result.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectra_types::SystemMetric;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emits_envelope_on_ok() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let mut calls = 0u32;
        let collect: CollectFn = Box::new(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![Metric::System(SystemMetric {
                    uptime_seconds: 1,
                    boot_time_unix: 0,
                    process_count: 1,
                    logged_in_users: 0,
                })])
            } else {
                Err(Error::NotSupported)
            }
        });

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(run(
            "test",
            Duration::from_millis(10),
            collect,
            tx,
            "host".into(),
            cancel_clone,
        ));

        let envelope = rx.recv().await.expect("expected first-tick envelope");
        assert_eq!(envelope.data.type_tag(), "system");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn empty_ok_emits_nothing() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let collect: CollectFn = Box::new(|| Ok(Vec::new()));

        let cancel_clone = cancel.clone();
        let handle =
            tokio::spawn(run("test", Duration::from_millis(5), collect, tx, "host".into(), cancel_clone));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let _ = handle.await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn panic_in_collect_does_not_kill_the_loop() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let mut calls = 0u32;
        let collect: CollectFn = Box::new(move || {
            calls += 1;
            if calls == 1 {
                panic!("boom");
            }
            Ok(vec![Metric::System(SystemMetric {
                uptime_seconds: 1,
                boot_time_unix: 0,
                process_count: 1,
                logged_in_users: 0,
            })])
        });

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(run(
            "test",
            Duration::from_millis(10),
            collect,
            tx,
            "host".into(),
            cancel_clone,
        ));

        let envelope = rx.recv().await.expect("expected recovery after panic");
        assert_eq!(envelope.data.type_tag(), "system");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn run_async_emits_envelope_on_ok() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let collect: AsyncCollectFn = Box::new(|| {
            Box::pin(async {
                Ok(vec![Metric::System(SystemMetric {
                    uptime_seconds: 1,
                    boot_time_unix: 0,
                    process_count: 1,
                    logged_in_users: 0,
                })])
            })
        });

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(run_async(
            "test-async",
            Duration::from_millis(10),
            collect,
            tx,
            "host".into(),
            cancel_clone,
        ));

        let envelope = rx.recv().await.expect("expected first-tick envelope");
        assert_eq!(envelope.data.type_tag(), "system");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn run_async_error_does_not_kill_the_loop() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_clone = calls.clone();
        let collect: AsyncCollectFn = Box::new(move || {
            let calls = calls_clone.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    Err(Error::NotSupported)
                } else {
                    Ok(vec![Metric::System(SystemMetric {
                        uptime_seconds: 1,
                        boot_time_unix: 0,
                        process_count: 1,
                        logged_in_users: 0,
                    })])
                }
            })
        });

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(run_async(
            "test-async",
            Duration::from_millis(10),
            collect,
            tx,
            "host".into(),
            cancel_clone,
        ));

        let envelope = rx.recv().await.expect("expected recovery after error");
        assert_eq!(envelope.data.type_tag(), "system");

        cancel.cancel();
        let _ = handle.await;
    }
}
