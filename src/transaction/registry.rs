//! Long transaction registry.
//!
//! A long transaction is a root store kept alive by the registry rather than by the context
//! tree that created it. Unrelated call sites reattach to it by key, each receiving a fresh
//! child of the registered root, and the holder of the creating context finalizes it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::transaction::context::Context;
use crate::transaction::error::{ScopeError, ScopeResult};
use crate::transaction::key::{AnyKey, OpaqueKey};
use crate::transaction::policy::DuplicateKeyPolicy;
use crate::transaction::store::StoreHandle;

/// Registry configuration options.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// What to do when a key is registered twice.
    pub duplicate_keys: DuplicateKeyPolicy,
}

impl RegistryConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duplicate key policy.
    pub fn duplicate_keys(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_keys = policy;
        self
    }
}

/// Bookkeeping for a registered long transaction.
#[derive(Debug, Clone, Serialize)]
pub struct LongTransactionInfo {
    /// `Debug` rendering of the registration key.
    pub key: String,
    /// Identifier of the registered root store.
    pub store_id: String,
    /// When the long transaction was created.
    pub created_at: DateTime<Utc>,
}

struct Entry {
    root: StoreHandle,
    info: LongTransactionInfo,
}

/// Keyed table of long transaction roots.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct LongTransactions {
    inner: Arc<LongTransactionsInner>,
}

struct LongTransactionsInner {
    config: RegistryConfig,
    entries: RwLock<HashMap<AnyKey, Entry>>,
}

impl Default for LongTransactions {
    fn default() -> Self {
        Self::new()
    }
}

impl LongTransactions {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with a custom configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(LongTransactionsInner {
                config,
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Create a long transaction under `key` and return a context exposing its root.
    ///
    /// The root is bound to `ctx` without any store `ctx` may carry, so the long transaction
    /// never joins the caller's scope tree.
    pub fn create_long_transaction<K: OpaqueKey>(
        &self,
        ctx: &Context,
        key: K,
    ) -> ScopeResult<Context> {
        let key = AnyKey::new(key);
        let mut entries = self.inner.entries.write();

        if entries.contains_key(&key) {
            if !self.inner.config.duplicate_keys.allows_replace() {
                return Err(ScopeError::AlreadyExists {
                    key: key.describe(),
                });
            }
            tracing::warn!(key = ?key, "replacing registered long transaction");
        }

        let bound = ctx.without_store();
        let root = StoreHandle::new_root(bound.clone());
        let info = LongTransactionInfo {
            key: key.describe(),
            store_id: root.id().to_string().to_lowercase(),
            created_at: Utc::now(),
        };
        tracing::debug!(key = ?key, store = %root.id(), "long transaction created");

        let scoped = bound.with_store(root.clone());
        let replaced = entries.insert(key, Entry { root, info });
        drop(entries);
        drop(replaced);
        Ok(scoped)
    }

    /// Reattach to the long transaction registered under `key`.
    ///
    /// The returned context carries a new child of the registered root: participants and
    /// scratch values added through it land on the shared root, and committing it is a no-op.
    pub fn get_long_transaction<K: OpaqueKey>(&self, key: K) -> ScopeResult<Context> {
        let key = AnyKey::new(key);
        let entries = self.inner.entries.read();
        match entries.get(&key) {
            Some(entry) => {
                let child = entry.root.child();
                Ok(entry.root.bound_context().with_store(child))
            }
            None => Err(ScopeError::NotFound {
                key: key.describe(),
            }),
        }
    }

    /// Remove the registration for `key`, returning whether one existed.
    ///
    /// Contexts obtained earlier keep their reference to the root and keep working.
    pub fn delete_long_transaction<K: OpaqueKey>(&self, key: K) -> bool {
        let key = AnyKey::new(key);
        let removed = self.inner.entries.write().remove(&key);
        match removed {
            Some(entry) => {
                tracing::debug!(key = ?key, store = %entry.root.id(), "long transaction deleted");
                true
            }
            None => false,
        }
    }

    /// Check if a long transaction is registered under `key`.
    pub fn contains<K: OpaqueKey>(&self, key: K) -> bool {
        self.inner.entries.read().contains_key(&AnyKey::new(key))
    }

    /// Get the number of registered long transactions.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Check if no long transaction is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Get bookkeeping for the long transaction registered under `key`.
    pub fn info<K: OpaqueKey>(&self, key: K) -> Option<LongTransactionInfo> {
        self.inner
            .entries
            .read()
            .get(&AnyKey::new(key))
            .map(|entry| entry.info.clone())
    }

    /// List every registered long transaction, oldest first.
    pub fn list(&self) -> Vec<LongTransactionInfo> {
        let mut infos: Vec<_> = self
            .inner
            .entries
            .read()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.store_id.cmp(&b.store_id))
        });
        infos
    }
}

impl std::fmt::Debug for LongTransactions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongTransactions")
            .field("config", &self.inner.config)
            .field("registered", &self.len())
            .finish()
    }
}
