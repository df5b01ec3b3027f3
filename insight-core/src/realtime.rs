//! Realtime change feed
//!
//! Live dashboards subscribe to row changes instead of polling. The store
//! publishes a [`ChangeEvent`] after every successful write; subscribers
//! receive the events matching their [`ChangeFilter`] over a broadcast
//! channel.
//!
//! ```rust,ignore
//! let feed = ChangeFeed::new(256);
//! let db = Database::open_in_memory()?.with_change_feed(feed.clone());
//! let mut sub = feed.subscribe(ChangeFilter::table(Table::Events));
//! while let Some(change) = sub.recv().await {
//!     println!("{:?} {}", change.kind, change.key);
//! }
//! ```

use serde::Serialize;
use tokio::sync::broadcast;

/// Tables that emit change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Events,
    Sessions,
    PageViews,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Events => "events",
            Table::Sessions => "sessions",
            Table::PageViews => "page_views",
        }
    }
}

/// What happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Row key: session id for sessions, row id for events, `date:path` for page views
    pub key: String,
}

/// Which changes a subscriber wants. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub tables: Vec<Table>,
    pub kinds: Vec<ChangeKind>,
}

impl ChangeFilter {
    /// Every change on one table.
    pub fn table(table: Table) -> Self {
        Self {
            tables: vec![table],
            kinds: vec![],
        }
    }

    /// Restrict to the given change kinds.
    pub fn with_kinds(mut self, kinds: &[ChangeKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        (self.tables.is_empty() || self.tables.contains(&event.table))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
    }
}

/// Publishing side of the feed. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(delivered, "Published change event");
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription {
        ChangeSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiving side of a filtered subscription.
pub struct ChangeSubscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl ChangeSubscription {
    /// Wait for the next matching change.
    ///
    /// Returns `None` once every publisher has been dropped. A subscriber
    /// that falls behind skips the overwritten events and keeps going.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv) for synchronous callers.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
