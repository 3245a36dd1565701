//! Restart-with-jittered-backoff wrapper (C7, spec §4.4), generalizing the
//! original's `run_forever`: run a worker, log how it ended, sleep for
//! `rand(0, 2*target_interval) - elapsed` clamped to zero, loop forever.
//! Randomized jitter keeps multiple workers sharing a failure mode (e.g. a
//! transient cluster API outage) from restarting in lockstep.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;

const TARGET_INTERVAL: Duration = Duration::from_secs(15);

/// Runs `make_worker()` in a loop, restarting it (after a jittered sleep)
/// whenever it returns `Err` or panics. Never returns; intended to be
/// spawned as its own task per long-lived worker (the watcher, the
/// reconciler).
pub async fn supervise<F>(name: &str, mut make_worker: F)
where
    F: FnMut() -> BoxFuture<'static, anyhow::Result<()>>,
{
    loop {
        let start = Instant::now();

        let outcome = std::panic::AssertUnwindSafe(make_worker()).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => tracing::info!(worker = name, "worker returned normally"),
            Ok(Err(err)) => tracing::error!(worker = name, error = %err, "worker exited with an error"),
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::error!(worker = name, panic = %message, "worker panicked");
            }
        }

        let elapsed = start.elapsed();
        let jitter = rand::rng().random_range(Duration::ZERO..=(TARGET_INTERVAL * 2));
        let sleep_for = jitter.checked_sub(elapsed).unwrap_or(Duration::ZERO);

        tracing::debug!(worker = name, sleep_ms = sleep_for.as_millis() as u64, "sleeping before restart");
        tokio::time::sleep(sleep_for).await;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
