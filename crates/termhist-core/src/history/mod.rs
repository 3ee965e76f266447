//! Bounded, persisted LRU history
//!
//! Keeps the N most recent distinct entries per domain, hydrates lazily
//! from durable storage, persists the full map after every mutation, and
//! flags (but does not reconcile) writes made by other processes sharing
//! the same storage namespace.

use crate::events::Subscription;
use crate::settings::{SettingsProvider, SettingsChangeEvent};
use crate::storage::{KeyValueStorage, StorageChangeEvent, StorageScope, StorageTarget, StorageValue};
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Setting that bounds every history instance
pub const HISTORY_LIMIT_SETTING: &str = "terminal.history.limit";

/// Bound applied when the setting is absent or not a non-negative integer
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const ENTRIES_KEY_PREFIX: &str = "terminal.history.entries.";
const TIMESTAMP_KEY_PREFIX: &str = "terminal.history.timestamp.";

/// Persisted record format: `{"entries":[{"key":..,"value":..},..]}`
#[derive(Serialize, Deserialize)]
struct SerializedHistory<T> {
    entries: Vec<SerializedEntry<T>>,
}

#[derive(Serialize, Deserialize)]
struct SerializedEntry<T> {
    key: String,
    value: T,
}

struct HistoryState<T> {
    cache: LruCache<String, T>,
    is_ready: bool,
}

struct HistoryInner<T> {
    domain: String,
    entries_key: String,
    timestamp_key: String,
    storage: Arc<dyn KeyValueStorage>,
    state: Mutex<HistoryState<T>>,
    stale: AtomicBool,
    last_save: AtomicI64,
}

/// Bounded LRU history persisted under a domain-derived storage namespace
///
/// All operations are total and synchronous. Malformed persisted data
/// hydrates as an empty history; a non-numeric limit setting falls back
/// to [`DEFAULT_HISTORY_LIMIT`]. Cross-process writes are detected via
/// the domain's timestamp key and only flag the instance stale; the next
/// access clears the flag without reloading (detection, not resolution).
pub struct PersistedHistory<T> {
    inner: Arc<HistoryInner<T>>,
    _subscriptions: Vec<Subscription>,
}

impl<T> std::fmt::Debug for PersistedHistory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedHistory").finish_non_exhaustive()
    }
}

impl<T> PersistedHistory<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a history over `domain`, wiring up the settings- and
    /// storage-change subscriptions. Hydration happens lazily on first
    /// access, not here.
    pub fn new(
        domain: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        let domain = domain.into();
        let limit = configured_limit(settings.as_ref());

        let inner = Arc::new(HistoryInner {
            entries_key: format!("{ENTRIES_KEY_PREFIX}{domain}"),
            timestamp_key: format!("{TIMESTAMP_KEY_PREFIX}{domain}"),
            domain,
            storage: storage.clone(),
            state: Mutex::new(HistoryState {
                cache: LruCache::new(non_zero(limit)),
                is_ready: false,
            }),
            stale: AtomicBool::new(false),
            last_save: AtomicI64::new(0),
        });

        // Handlers hold weak references so a late event against a dropped
        // history is a no-op.
        let mut subscriptions = Vec::with_capacity(2);

        let weak: Weak<HistoryInner<T>> = Arc::downgrade(&inner);
        let handler_settings = settings.clone();
        subscriptions.push(settings.on_did_change(Box::new(
            move |event: &SettingsChangeEvent| {
                if !event.affects(HISTORY_LIMIT_SETTING) {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    inner.resize(configured_limit(handler_settings.as_ref()));
                }
            },
        )));

        let weak: Weak<HistoryInner<T>> = Arc::downgrade(&inner);
        subscriptions.push(storage.on_did_change_value(Box::new(
            move |event: &StorageChangeEvent| {
                let Some(inner) = weak.upgrade() else { return };
                if event.scope != StorageScope::Application || event.key != inner.timestamp_key {
                    return;
                }
                if inner.stale.load(Ordering::SeqCst) {
                    return;
                }
                // The instance's own saves bump `last_save` before writing,
                // so only another process's write can differ here.
                let stored =
                    inner
                        .storage
                        .get_number(&inner.timestamp_key, StorageScope::Application, 0);
                if stored != inner.last_save.load(Ordering::SeqCst) {
                    debug!(domain = %inner.domain, "History modified by another process, marking stale");
                    inner.stale.store(true, Ordering::SeqCst);
                }
            },
        )));

        Self {
            inner,
            _subscriptions: subscriptions,
        }
    }

    /// Domain name this history persists under
    pub fn domain(&self) -> &str {
        &self.inner.domain
    }

    /// Snapshot of the current contents, least recently used first
    pub fn entries(&self) -> Vec<(String, T)> {
        let mut state = self.inner.state.lock();
        self.inner.ensure_up_to_date(&mut state);
        state
            .cache
            .iter()
            .rev()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Insert or update an entry, promote it to most recently used, and
    /// persist. Evicts the least recently used entry when over the bound.
    pub fn add(&self, key: impl Into<String>, value: T) {
        let mut state = self.inner.state.lock();
        self.inner.ensure_up_to_date(&mut state);
        state.cache.put(key.into(), value);
        self.inner.save(&state);
    }

    /// Delete an entry if present (no-op otherwise) and persist
    pub fn remove(&self, key: &str) {
        let mut state = self.inner.state.lock();
        self.inner.ensure_up_to_date(&mut state);
        state.cache.pop(key);
        self.inner.save(&state);
    }

    /// Empty the history and persist an empty record
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        self.inner.ensure_up_to_date(&mut state);
        state.cache.clear();
        self.inner.save(&state);
    }

    /// Change the bound, evicting least recently used entries down to it.
    /// A bound of 0 is clamped to 1. Invoked reactively when the limit
    /// setting changes; also callable directly.
    pub fn resize(&self, new_limit: usize) {
        self.inner.resize(new_limit);
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        let mut state = self.inner.state.lock();
        self.inner.ensure_up_to_date(&mut state);
        state.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bound
    pub fn limit(&self) -> usize {
        self.inner.state.lock().cache.cap().get()
    }

    /// Whether an external write has been detected and not yet observed.
    /// The flag clears on the next access without any reload.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::SeqCst)
    }
}

impl<T> HistoryInner<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn ensure_up_to_date(&self, state: &mut HistoryState<T>) {
        if !state.is_ready {
            self.hydrate(state);
            state.is_ready = true;
        }
        if self.stale.swap(false, Ordering::SeqCst) {
            // Known gap: staleness is detected but not reconciled. The
            // flag clears without reloading, keeping this process's view.
            debug!(domain = %self.domain, "Clearing stale flag without reload");
        }
    }

    fn hydrate(&self, state: &mut HistoryState<T>) {
        let Some(text) = self.storage.get(&self.entries_key, StorageScope::Application) else {
            debug!(domain = %self.domain, "No persisted history");
            return;
        };
        let Some(record) = parse_record::<T>(&text) else {
            warn!(domain = %self.domain, "Malformed persisted history, starting empty");
            return;
        };
        // Entries are serialized least recently used first, so re-inserting
        // in order reproduces the recency order exactly.
        for entry in record.entries {
            state.cache.put(entry.key, entry.value);
        }
        let timestamp =
            self.storage
                .get_number(&self.timestamp_key, StorageScope::Application, 0);
        self.last_save.store(timestamp, Ordering::SeqCst);
        debug!(domain = %self.domain, entries = state.cache.len(), "Hydrated history");
    }

    fn save(&self, state: &HistoryState<T>) {
        let record = SerializedHistory {
            entries: state
                .cache
                .iter()
                .rev()
                .map(|(key, value)| SerializedEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        };
        let text = match serde_json::to_string(&record) {
            Ok(text) => text,
            Err(error) => {
                warn!(domain = %self.domain, %error, "Failed to serialize history, skipping save");
                return;
            }
        };

        // Bump the in-memory timestamp before the writes so this instance's
        // own change notifications compare equal and never flag it stale.
        let now = Utc::now().timestamp_millis();
        self.last_save.store(now, Ordering::SeqCst);
        self.storage.set(
            &self.entries_key,
            StorageValue::Text(text),
            StorageScope::Application,
            StorageTarget::Machine,
        );
        self.storage.set(
            &self.timestamp_key,
            StorageValue::Number(now),
            StorageScope::Application,
            StorageTarget::Machine,
        );
        debug!(domain = %self.domain, entries = state.cache.len(), "Persisted history");
    }

    fn resize(&self, new_limit: usize) {
        let mut state = self.state.lock();
        state.cache.resize(non_zero(new_limit));
        debug!(domain = %self.domain, limit = state.cache.cap().get(), "Resized history");
    }
}

/// Read the configured limit, falling back to the default for absent or
/// non-numeric values (`null`, strings, negative or fractional numbers).
fn configured_limit(settings: &dyn SettingsProvider) -> usize {
    match settings.get_value(HISTORY_LIMIT_SETTING) {
        Some(serde_json::Value::Number(number)) => number
            .as_u64()
            .map(|value| value as usize)
            .unwrap_or(DEFAULT_HISTORY_LIMIT),
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

fn non_zero(limit: usize) -> NonZeroUsize {
    NonZeroUsize::new(limit.max(1)).unwrap_or(NonZeroUsize::MIN)
}

fn parse_record<T: DeserializeOwned>(text: &str) -> Option<SerializedHistory<T>> {
    serde_json::from_str(text).ok()
}
