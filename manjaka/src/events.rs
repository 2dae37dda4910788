//! Refresh notifications.
//!
//! After a successful mutation the client publishes one [`RefreshEvent`] per
//! affected resource family so that views can reload what they show.

use smol_str::SmolStr;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// A resource family whose data changed server-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshEvent {
    /// Transactions or transfers changed.
    TransactionsUpdated,
    /// Account balances or the account list changed.
    AccountsUpdated,
    /// Categories or sub-categories changed.
    CategoriesUpdated,
    /// Any other resource changed.
    ResourceUpdated(SmolStr),
}

impl RefreshEvent {
    /// Event announcing a change to `resource`.
    pub fn for_resource(resource: &str) -> Self {
        match resource {
            "transactions" | "transferts" => Self::TransactionsUpdated,
            "comptes" => Self::AccountsUpdated,
            "categories" | "sous-categories" => Self::CategoriesUpdated,
            other => Self::ResourceUpdated(other.into()),
        }
    }
}

/// Broadcast channel for [`RefreshEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RefreshEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event; returns the number of subscribers reached.
    pub fn publish(&self, event: RefreshEvent) -> usize {
        trace!(?event, "publishing refresh event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Publishes one event per distinct family among `resources`.
    pub fn publish_for<'a>(&self, resources: impl IntoIterator<Item = &'a str>) {
        let mut sent = Vec::new();
        for event in resources.into_iter().map(RefreshEvent::for_resource) {
            if !sent.contains(&event) {
                self.publish(event.clone());
                sent.push(event);
            }
        }
    }
}
