//! The seam between the bridge and the relay protocol host.
//!
//! The host owns connections and subscriptions. The bridge only needs to
//! know which filters are currently live and where to push new events.

use async_trait::async_trait;
use newsrelay_types::{Event, Filter};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("relay host is no longer accepting events")]
    Closed,
}

#[async_trait]
pub trait RelayHost: Send + Sync {
    /// Filters of all currently open subscriptions.
    fn active_filters(&self) -> Vec<Filter>;

    /// Pushes a signed event into the host's inbound stream.
    async fn deliver(&self, event: Event) -> Result<(), DeliveryError>;
}

/// A host adapter backed by a subscription registry and a bounded channel.
///
/// Whoever owns the receiving half fans events out to subscribers.
pub struct ChannelHost {
    subscriptions: RwLock<HashMap<String, Vec<Filter>>>,
    tx: mpsc::Sender<Event>,
}

impl ChannelHost {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        let host = Self {
            subscriptions: RwLock::new(HashMap::new()),
            tx,
        };
        (host, rx)
    }

    /// Opens or replaces a subscription.
    pub fn subscribe(&self, id: impl Into<String>, filters: Vec<Filter>) {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into(), filters);
    }

    pub fn unsubscribe(&self, id: &str) {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

#[async_trait]
impl RelayHost for ChannelHost {
    fn active_filters(&self) -> Vec<Filter> {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    async fn deliver(&self, event: Event) -> Result<(), DeliveryError> {
        self.tx.send(event).await.map_err(|_| DeliveryError::Closed)
    }
}
