//! File-backed key-value storage
//!
//! One JSON document per store, written through on every effective write.
//! Cross-process visibility is pull-based: a host that watches the file
//! calls [`FileStorage::reload`], which diffs the document against the
//! in-memory view and fires change events for every key that differs.

use super::{KeyValueStorage, ScopedValues, StorageChangeEvent, StorageScope, StorageTarget, StorageValue};
use crate::error::{HistoryError, HistoryResult};
use crate::events::{EventEmitter, Subscription};
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Durable, machine-local key-value store backed by a single JSON file
pub struct FileStorage {
    path: PathBuf,
    data: RwLock<ScopedValues>,
    emitter: EventEmitter<StorageChangeEvent>,
}

impl FileStorage {
    /// Open a store at `path`, hydrating from the file if it exists.
    ///
    /// A missing file opens as an empty store; a malformed file is logged
    /// and also opens empty. Only real IO trouble (permissions etc.) is an
    /// error.
    pub fn open(path: impl Into<PathBuf>) -> HistoryResult<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(error) => {
                    warn!(path = %path.display(), %error, "Malformed storage file, starting empty");
                    ScopedValues::default()
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => ScopedValues::default(),
            Err(error) => return Err(HistoryError::Io(error)),
        };

        debug!(path = %path.display(), "Opened file storage");
        Ok(Self {
            path,
            data: RwLock::new(data),
            emitter: EventEmitter::new(),
        })
    }

    /// Open the default store (`~/.termhist/storage.json`)
    pub fn open_default() -> HistoryResult<Self> {
        let path = dirs::home_dir()
            .ok_or(HistoryError::PathUnavailable)?
            .join(".termhist")
            .join("storage.json");
        Self::open(path)
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of registered change listeners
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }

    /// Re-read the backing file and fire change events for every key whose
    /// value changed or disappeared since the in-memory view was taken.
    ///
    /// This is the hook a file watcher calls to surface another process's
    /// writes. A missing file reloads as empty (all keys deleted); a
    /// malformed or unreadable file is logged and leaves the view untouched.
    pub fn reload(&self) {
        let new_data: ScopedValues = match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(error) => {
                    warn!(path = %self.path.display(), %error, "Malformed storage file on reload, keeping current view");
                    return;
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => ScopedValues::default(),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "Failed to reload storage file");
                return;
            }
        };

        let mut events = Vec::new();
        {
            let mut data = self.data.write();
            for scope in [StorageScope::Application, StorageScope::Workspace] {
                let old_values = data.scope(scope);
                let new_values = new_data.scope(scope);
                for (key, old_value) in old_values {
                    if new_values.get(key) != Some(old_value) {
                        events.push(StorageChangeEvent {
                            key: key.clone(),
                            scope,
                        });
                    }
                }
                for key in new_values.keys() {
                    if !old_values.contains_key(key) {
                        events.push(StorageChangeEvent {
                            key: key.clone(),
                            scope,
                        });
                    }
                }
            }
            *data = new_data;
        }

        debug!(path = %self.path.display(), changes = events.len(), "Reloaded file storage");
        for event in &events {
            self.emitter.fire(event);
        }
    }

    fn write_through(&self, data: &ScopedValues) {
        if let Some(parent) = self.path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                warn!(path = %self.path.display(), %error, "Failed to create storage directory");
                return;
            }
        }
        let text = match serde_json::to_string_pretty(data) {
            Ok(text) => text,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "Failed to serialize storage document");
                return;
            }
        };
        if let Err(error) = fs::write(&self.path, text) {
            warn!(path = %self.path.display(), %error, "Failed to write storage file");
        }
    }
}

impl KeyValueStorage for FileStorage {
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
            self.write_through(&data);
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
            self.write_through(&data);
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
