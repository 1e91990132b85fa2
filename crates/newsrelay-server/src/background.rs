//! Background tasks for the newsrelay server.
//!
//! Includes:
//! - Registering the feeds listed in the configuration.
//! - Polling live subscriptions for new notes.
//! - Draining the host channel when no relay consumes it.

use crate::bridge::Bridge;
use crate::config::FeedSeed;
use crate::host::RelayHost;
use newsrelay_types::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// Registers every configured feed. Failures are logged and skipped.
///
/// Returns the number of feeds that registered successfully.
pub async fn seed_feeds(bridge: Arc<Bridge>, seeds: Vec<FeedSeed>) -> usize {
    let mut registered = 0;
    for seed in seeds {
        match bridge.register(&seed.url, Some(seed.meta())).await {
            Ok(registration) => {
                tracing::info!(
                    name = %seed.name,
                    pubkey = %registration.pubkey,
                    feed_url = %registration.feed_url,
                    "seeded feed"
                );
                registered += 1;
            }
            Err(e) => {
                tracing::error!(url = %seed.url, error = %e, "failed to seed feed");
            }
        }
    }
    registered
}

/// Starts the subscription polling task.
///
/// Runs indefinitely. The first pass happens one interval after start.
pub async fn start_poll_task(bridge: Arc<Bridge>, host: Arc<dyn RelayHost>, interval: Duration) {
    if interval.is_zero() {
        tracing::warn!("poll task disabled (interval=0)");
        return;
    }

    tracing::info!(interval_seconds = interval.as_secs(), "starting poll task");

    loop {
        sleep(interval).await;

        let delivered = bridge.poll_once(host.as_ref()).await;
        if delivered > 0 {
            tracing::info!(count = delivered, "delivered new events");
        }
    }
}

/// Consumes delivered events until every sender is dropped.
pub async fn drain_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        tracing::debug!(
            id = %event.id,
            pubkey = %event.pubkey,
            kind = event.kind.as_u32(),
            "event delivered"
        );
    }
    tracing::info!("event channel closed");
}
