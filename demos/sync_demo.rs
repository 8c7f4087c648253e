//! Demonstrates retries, the periodic sync job, and stopping an engine
//!
//! Run with: cargo run --example sync_demo --features tracing

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resync::config::{BackoffKind, RetryConfig};
use resync::{Outcome, SyncConfig, SyncEngine};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let engine = SyncEngine::new(SyncConfig {
        retry: RetryConfig {
            max_attempts: 4,
            base_delay_ms: 100,
            backoff: BackoffKind::Exponential,
            ..RetryConfig::default()
        },
        interval_secs: 1,
        ..SyncConfig::default()
    })
    .expect("valid config");

    // Fails twice, then succeeds.
    let calls = Arc::new(AtomicU32::new(0));
    let outcome = engine
        .retry_sync({
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("server unavailable (call {})", n))
                    } else {
                        Ok(n)
                    }
                }
            }
        })
        .await
        .expect("sync task panicked");

    match outcome {
        Outcome::Succeeded { value, attempts } => {
            tracing::info!("Synced on call {} after {} attempts", value, attempts)
        }
        Outcome::Failed(e) => tracing::error!("Sync failed: {}", e),
        Outcome::Cancelled(c) => tracing::info!("Sync cancelled: {}", c),
    }

    // Periodic job every second.
    let ticks = Arc::new(AtomicU32::new(0));
    engine
        .start_periodic_sync({
            let ticks = ticks.clone();
            move || {
                ticks.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(()) }
            }
        })
        .expect("engine running");

    tokio::time::sleep(Duration::from_millis(3500)).await;
    tracing::info!("Periodic sync ran {} times", ticks.load(Ordering::SeqCst));

    // A run that never succeeds, stopped mid-backoff.
    let pending = engine.retry_sync(|| async { Err::<(), _>("offline".to_string()) });
    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.stop_sync();

    let outcome = pending.await.expect("sync task panicked");
    tracing::info!("After stop_sync: cancelled = {}", outcome.is_cancelled());
}
