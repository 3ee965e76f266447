//! Per-domain history singletons
//!
//! Hosts obtain one shared [`PersistedHistory`] per domain name through a
//! [`HistoryRegistry`]; instances are constructed on first request and
//! cached for the life of the registry. An optional process-global slot
//! mirrors the usual embedding, where one registry serves the whole
//! process.

use crate::error::{HistoryError, HistoryResult};
use crate::history::PersistedHistory;
use crate::settings::SettingsProvider;
use crate::storage::KeyValueStorage;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

static GLOBAL_REGISTRY: OnceCell<HistoryRegistry> = OnceCell::new();

/// Registry of per-domain history singletons over one storage/settings pair
pub struct HistoryRegistry {
    storage: Arc<dyn KeyValueStorage>,
    settings: Arc<dyn SettingsProvider>,
    histories: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl HistoryRegistry {
    pub fn new(storage: Arc<dyn KeyValueStorage>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            storage,
            settings,
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// The history for `domain`, constructing it on first request.
    ///
    /// Every call for the same domain returns the same instance. Requesting
    /// an existing domain with a different value type is an error, never a
    /// panic.
    pub fn history<T>(&self, domain: &str) -> HistoryResult<Arc<PersistedHistory<T>>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        if let Some(existing) = self.histories.read().get(domain) {
            return downcast(domain, existing.clone());
        }

        let mut histories = self.histories.write();
        // Racing constructors settle on whichever entry landed first.
        let entry = histories
            .entry(domain.to_string())
            .or_insert_with(|| {
                debug!(domain, "Creating history");
                Arc::new(PersistedHistory::<T>::new(
                    domain,
                    self.storage.clone(),
                    self.settings.clone(),
                ))
            })
            .clone();
        drop(histories);

        downcast(domain, entry)
    }

    /// Drop the cached history for `domain`, detaching its subscriptions.
    /// Returns whether an instance was cached.
    pub fn remove(&self, domain: &str) -> bool {
        self.histories.write().remove(domain).is_some()
    }

    /// Number of cached histories
    pub fn len(&self) -> usize {
        self.histories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.read().is_empty()
    }
}

fn downcast<T>(
    domain: &str,
    entry: Arc<dyn Any + Send + Sync>,
) -> HistoryResult<Arc<PersistedHistory<T>>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    entry
        .downcast::<PersistedHistory<T>>()
        .map_err(|_| HistoryError::DomainTypeMismatch(domain.to_string()))
}

/// Install the process-global registry. First initialization wins; the
/// installed registry is returned either way.
pub fn init_global(registry: HistoryRegistry) -> &'static HistoryRegistry {
    GLOBAL_REGISTRY.get_or_init(move || registry)
}

/// The process-global registry, if one has been installed
pub fn global() -> Option<&'static HistoryRegistry> {
    GLOBAL_REGISTRY.get()
}
