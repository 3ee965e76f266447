//! In-memory key-value storage
//!
//! Backend for unit tests and single-process embeddings. Shares the
//! change-notification contract with the durable backends so histories
//! behave identically over it.

use super::{KeyValueStorage, ScopedValues, StorageChangeEvent, StorageScope, StorageTarget, StorageValue};
use crate::events::{EventEmitter, Subscription};
use parking_lot::RwLock;

/// Non-durable, process-local key-value store
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<ScopedValues>,
    emitter: EventEmitter<StorageChangeEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered change listeners
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str, scope: StorageScope) -> Option<String> {
        self.data
            .read()
            .scope(scope)
            .get(key)
            .map(StorageValue::to_text)
    }

    fn get_number(&self, key: &str, scope: StorageScope, default: i64) -> i64 {
        self.data
            .read()
            .scope(scope)
            .get(key)
            .and_then(StorageValue::as_number)
            .unwrap_or(default)
    }

    fn set(&self, key: &str, value: StorageValue, scope: StorageScope, _target: StorageTarget) {
        {
            let mut data = self.data.write();
            let values = data.scope_mut(scope);
            if values.get(key) == Some(&value) {
                return;
            }
            values.insert(key.to_string(), value);
        }
        self.emitter.fire(&StorageChangeEvent {
            key: key.to_string(),
            scope,
        });
    }

    fn delete(&self, key: &str, scope: StorageScope) {
        {
            let mut data = self.data.write();
            if data.scope_mut(scope).remove(key).is_none() {
                return;
            }
        }
        self.emitter.fire(&StorageChangeEvent {
            key: key.to_string(),
            scope,
        });
    }

    fn on_did_change_value(
        &self,
        listener: Box<dyn Fn(&StorageChangeEvent) + Send + Sync>,
    ) -> Subscription {
        self.emitter.listen(listener)
    }
}
