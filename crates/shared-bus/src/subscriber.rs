//! # Subscriptions
//!
//! A subscription is a (subscriber identity, kind filter, async callback)
//! tuple owned by the bus. The returned handle unsubscribes on drop; the
//! bus does not detect subscriber liveness beyond that.

use futures::future::BoxFuture;
use shared_types::{EventEnvelope, EventFilter};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tracing::debug;
use uuid::Uuid;

/// Boxed error returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An async callback invoked once per matching event.
///
/// Errors are logged by the dispatch loop and never propagated to the
/// publisher; a callback is not retried.
pub type SubscriberCallback =
    Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// One registered subscription in the bus table.
pub(crate) struct SubscriberEntry {
    /// Subscriber identity, for logs.
    pub label: String,
    /// Kind filter (empty = all kinds).
    pub filter: EventFilter,
    /// Delivery callback.
    pub callback: SubscriberCallback,
}

pub(crate) type SubscriberTable = Arc<RwLock<HashMap<Uuid, SubscriberEntry>>>;

/// Handle for a registered subscription.
///
/// Dropping the handle unsubscribes.
pub struct SubscriberHandle {
    id: Uuid,
    label: String,
    table: Weak<RwLock<HashMap<Uuid, SubscriberEntry>>>,
}

impl SubscriberHandle {
    pub(crate) fn new(id: Uuid, label: String, table: &SubscriberTable) -> Self {
        Self {
            id,
            label,
            table: Arc::downgrade(table),
        }
    }

    /// The subscription id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Explicitly remove the subscription (same as dropping the handle).
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let Ok(mut table) = table.write() else {
            return;
        };
        table.remove(&self.id);
        debug!(subscriber = %self.label, "subscription removed");
    }
}
