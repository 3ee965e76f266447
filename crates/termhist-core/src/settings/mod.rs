//! Configuration source abstraction and a flat dotted-key registry
//!
//! The history core reads a single numeric setting and reacts to changes
//! of it. [`SettingsProvider`] is the contract it consumes; a host with
//! its own configuration system implements it, and [`SettingsRegistry`]
//! is the in-repo implementation.

use crate::error::{HistoryError, HistoryResult};
use crate::events::{EventEmitter, Subscription};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Notification that one or more settings changed
#[derive(Debug, Clone)]
pub struct SettingsChangeEvent {
    keys: Vec<String>,
}

impl SettingsChangeEvent {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn single(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
        }
    }

    /// Whether a change touches `key`, honoring dotted-key hierarchy in
    /// both directions: a change to `a.b` affects queries for `a.b`,
    /// `a.b.c`, and `a`.
    pub fn affects(&self, key: &str) -> bool {
        self.keys.iter().any(|changed| keys_overlap(changed, key))
    }

    /// Keys named by the change
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

fn keys_overlap(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
    longer.starts_with(shorter) && longer.as_bytes().get(shorter.len()) == Some(&b'.')
}

/// Configuration source consumed by the history core
pub trait SettingsProvider: Send + Sync {
    /// Current value for a dotted key, if configured
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Register for settings-change notifications.
    fn on_did_change(
        &self,
        listener: Box<dyn Fn(&SettingsChangeEvent) + Send + Sync>,
    ) -> Subscription;
}

/// Flat dotted-key settings map with change notifications
#[derive(Default)]
pub struct SettingsRegistry {
    values: RwLock<HashMap<String, Value>>,
    emitter: EventEmitter<SettingsChangeEvent>,
}

impl std::fmt::Debug for SettingsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsRegistry").finish_non_exhaustive()
    }
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON object document.
    ///
    /// Keys are taken as-is, so the document uses the flat dotted form,
    /// e.g. `{"terminal.history.limit": 50}`.
    pub fn from_file(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&text)?;
        let Value::Object(map) = document else {
            return Err(HistoryError::InvalidData(format!(
                "settings document {} is not a JSON object",
                path.display()
            )));
        };

        debug!(path = %path.display(), settings = map.len(), "Loaded settings file");
        Ok(Self {
            values: RwLock::new(map.into_iter().collect()),
            emitter: EventEmitter::new(),
        })
    }

    /// Set a value, firing a change event if it differs from the current one
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        {
            let mut values = self.values.write();
            if values.get(&key) == Some(&value) {
                return;
            }
            values.insert(key.clone(), value);
        }
        self.emitter.fire(&SettingsChangeEvent::single(key));
    }

    /// Remove a value, firing a change event if it was present
    pub fn remove(&self, key: &str) {
        {
            let mut values = self.values.write();
            if values.remove(key).is_none() {
                return;
            }
        }
        self.emitter
            .fire(&SettingsChangeEvent::single(key.to_string()));
    }
}

impl SettingsProvider for SettingsRegistry {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn on_did_change(
        &self,
        listener: Box<dyn Fn(&SettingsChangeEvent) + Send + Sync>,
    ) -> Subscription {
        self.emitter.listen(listener)
    }
}
