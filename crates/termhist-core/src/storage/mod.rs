//! Durable key-value storage abstraction and implementations
//!
//! The history core only consumes the [`KeyValueStorage`] trait; the two
//! backends here make the system usable end to end: [`MemoryStorage`] for
//! tests and single-process embeddings, [`FileStorage`] for durable,
//! machine-local persistence shared across processes.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::events::Subscription;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Visibility scope of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Global scope: persisted across restarts and shared across processes
    /// on the same machine. The history keeps all of its state here.
    Application,
    /// Scoped to one workspace/window
    Workspace,
}

/// Advisory replication hint for a write
///
/// Both in-repo backends persist machine-locally and never sync, so they
/// accept and ignore the hint; hosts with a syncing store can honor it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTarget {
    /// May roam with the user's profile
    User,
    /// Stays on this machine
    Machine,
}

/// A storable value
///
/// Untagged so numbers persist as JSON numbers and strings as JSON strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorageValue {
    Number(i64),
    Text(String),
}

impl StorageValue {
    /// Decimal text form: numbers render through `to_string`
    pub fn to_text(&self) -> String {
        match self {
            StorageValue::Text(text) => text.clone(),
            StorageValue::Number(number) => number.to_string(),
        }
    }

    /// Numeric form: text values parse as decimal integers
    pub fn as_number(&self) -> Option<i64> {
        match self {
            StorageValue::Number(number) => Some(*number),
            StorageValue::Text(text) => text.parse().ok(),
        }
    }
}

impl From<String> for StorageValue {
    fn from(text: String) -> Self {
        StorageValue::Text(text)
    }
}

impl From<&str> for StorageValue {
    fn from(text: &str) -> Self {
        StorageValue::Text(text.to_string())
    }
}

impl From<i64> for StorageValue {
    fn from(number: i64) -> Self {
        StorageValue::Number(number)
    }
}

/// Notification that a key was effectively written (or deleted)
#[derive(Debug, Clone)]
pub struct StorageChangeEvent {
    pub key: String,
    pub scope: StorageScope,
}

/// Durable key-value store consumed by the history core
///
/// Writes are total: backends recover from their own IO trouble internally
/// (logging it) rather than surfacing errors through `set`/`delete`.
/// Change events fire for every effective write, including writes made by
/// the observing process itself; writing an unchanged value fires nothing.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value as text; numbers come back in decimal form.
    fn get(&self, key: &str, scope: StorageScope) -> Option<String>;

    /// Read a value as a number; absent or unparsable values yield `default`.
    fn get_number(&self, key: &str, scope: StorageScope, default: i64) -> i64;

    fn set(&self, key: &str, value: StorageValue, scope: StorageScope, target: StorageTarget);

    fn delete(&self, key: &str, scope: StorageScope);

    /// Register for change notifications across all scopes of this store.
    fn on_did_change_value(
        &self,
        listener: Box<dyn Fn(&StorageChangeEvent) + Send + Sync>,
    ) -> Subscription;
}

/// Per-scope value maps; doubles as the file backend's document format.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScopedValues {
    #[serde(default)]
    pub application: HashMap<String, StorageValue>,
    #[serde(default)]
    pub workspace: HashMap<String, StorageValue>,
}

impl ScopedValues {
    pub fn scope(&self, scope: StorageScope) -> &HashMap<String, StorageValue> {
        match scope {
            StorageScope::Application => &self.application,
            StorageScope::Workspace => &self.workspace,
        }
    }

    pub fn scope_mut(&mut self, scope: StorageScope) -> &mut HashMap<String, StorageValue> {
        match scope {
            StorageScope::Application => &mut self.application,
            StorageScope::Workspace => &mut self.workspace,
        }
    }
}
