//! Session context - the identity used to attribute REST calls
//!
//! The session is an explicit object handed to the client, never ambient
//! global state. Absence of an identity is a normal state, surfaced to
//! callers as "unauthenticated".

use crate::persistence::IdentityStore;
use parking_lot::RwLock;
use pbft_trade_types::Identity;
use std::path::Path;
use std::sync::Arc;

/// Shared handle to the current identity
#[derive(Clone, Default)]
pub struct Session {
    identity: Arc<RwLock<Option<Identity>>>,
    /// Durable backing; `None` keeps the identity in memory only
    store: Option<Arc<IdentityStore>>,
}

impl Session {
    /// Create a session that forgets its identity on exit
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a session backed by `store`, restoring any saved identity
    pub fn with_store(store: IdentityStore) -> Self {
        let restored = match store.load() {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!("Failed to restore identity: {}", e);
                None
            }
        };
        if let Some(identity) = &restored {
            tracing::info!("Restored session for {}", identity.username);
        }

        Self {
            identity: Arc::new(RwLock::new(restored)),
            store: Some(Arc::new(store)),
        }
    }

    /// Open a durable session at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::with_store(IdentityStore::open(path)?))
    }

    /// Set the identity after a successful login
    pub fn set_identity(&self, token: impl Into<String>, username: impl Into<String>) {
        let identity = Identity::new(token, username);
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&identity) {
                tracing::warn!("Failed to persist identity: {}", e);
            }
        }
        tracing::info!("Session identity set for {}", identity.username);
        *self.identity.write() = Some(identity);
    }

    /// Forget the identity and release its durable copy
    pub fn clear_identity(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!("Failed to clear persisted identity: {}", e);
            }
        }
        if self.identity.write().take().is_some() {
            tracing::info!("Session identity cleared");
        }
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.read().is_some()
    }
}
