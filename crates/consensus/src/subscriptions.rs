//! Subscription registry - fan-out of items to registered handlers
//!
//! Handlers run synchronously on the notifying task, in subscription order,
//! so delivery order matches notification order. Closing the registry waits
//! for an in-flight notification to finish; nothing is delivered after
//! `close()` returns.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Subscription ID
pub type SubscriptionId = u64;

/// Callback invoked for each delivered item
///
/// Handlers must not subscribe, unsubscribe or close from inside the
/// callback; the registry lock is held while they run.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    open: bool,
    handlers: BTreeMap<SubscriptionId, Handler<T>>,
}

/// Manages subscribers for one item type
pub struct Subscribers<T> {
    registry: RwLock<Registry<T>>,
    /// Next subscription ID
    next_id: AtomicU64,
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                open: true,
                handlers: BTreeMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.registry.write().handlers.insert(id, Arc::new(handler));
        tracing::debug!("Created subscription {}", id);
        id
    }

    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        let removed = self
            .registry
            .write()
            .handlers
            .remove(&subscription_id)
            .is_some();
        if removed {
            tracing::debug!("Removed subscription {}", subscription_id);
        }
        removed
    }

    /// Deliver `item` to every handler; returns how many received it
    pub fn notify(&self, item: &T) -> usize {
        let registry = self.registry.read();
        if !registry.open {
            return 0;
        }
        for handler in registry.handlers.values() {
            handler(item);
        }
        registry.handlers.len()
    }

    /// Stop all further deliveries
    pub fn close(&self) {
        self.registry.write().open = false;
    }

    pub fn is_closed(&self) -> bool {
        !self.registry.read().open
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.read().handlers.len()
    }

    pub fn has_subscription(&self, subscription_id: SubscriptionId) -> bool {
        self.registry
            .read()
            .handlers
            .contains_key(&subscription_id)
    }
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}
