//! Termhist Core Library
//!
//! Bounded, persisted LRU history for terminal-style hosts: each history
//! domain keeps its N most recent distinct entries, survives restarts by
//! serializing to a durable key-value store, and flags its in-memory view
//! stale when another process writes the same storage namespace.
//!
//! The core is [`PersistedHistory`]; it consumes storage and configuration
//! purely through the [`KeyValueStorage`] and [`SettingsProvider`] traits.
//! The rest of the crate supplies working implementations of those traits
//! plus the per-domain singleton registry hosts embed.

pub mod error;
pub mod events;
pub mod history;
pub mod registry;
pub mod settings;
pub mod storage;

// Re-export commonly used types
pub use error::{HistoryError, HistoryResult};
pub use events::{EventEmitter, Subscription};
pub use history::{DEFAULT_HISTORY_LIMIT, HISTORY_LIMIT_SETTING, PersistedHistory};
pub use registry::{HistoryRegistry, global, init_global};
pub use settings::{SettingsChangeEvent, SettingsProvider, SettingsRegistry};
pub use storage::{
    FileStorage, KeyValueStorage, MemoryStorage, StorageChangeEvent, StorageScope, StorageTarget,
    StorageValue,
};
