//! Keyed query cache with stale times and broadcast invalidation.
//!
//! Entries hold the decoded JSON of a response. Invalidation removes the
//! matching entries synchronously and then broadcasts, so any watcher woken
//! by the broadcast refetches instead of reading the dropped entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use contrax_core::ContractFilters;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

pub const CONTRACT_LIST_STALE: Duration = Duration::from_secs(5 * 60);
pub const DASHBOARD_STALE: Duration = Duration::from_secs(2 * 60);
pub const CONTRACT_TYPES_STALE: Duration = Duration::from_secs(30 * 60);

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Contracts(ContractFilters),
    Contract(String),
    Clauses(String),
    DashboardStats,
    ContractTypes,
}

/// Key families, for prefix-style invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Contracts,
    Contract,
    Clauses,
    DashboardStats,
    ContractTypes,
}

impl QueryKey {
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Contracts(_) => KeyFamily::Contracts,
            Self::Contract(_) => KeyFamily::Contract,
            Self::Clauses(_) => KeyFamily::Clauses,
            Self::DashboardStats => KeyFamily::DashboardStats,
            Self::ContractTypes => KeyFamily::ContractTypes,
        }
    }

    /// How long a cached value may be served without refetching.
    pub fn stale_time(&self) -> Duration {
        match self {
            Self::Contracts(_) => CONTRACT_LIST_STALE,
            Self::DashboardStats => DASHBOARD_STALE,
            Self::ContractTypes => CONTRACT_TYPES_STALE,
            Self::Contract(_) | Self::Clauses(_) => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Family(KeyFamily),
    Key(QueryKey),
}

impl Scope {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Family(family) => key.family() == *family,
            Self::Key(k) => k == key,
        }
    }
}

impl From<QueryKey> for Scope {
    fn from(key: QueryKey) -> Self {
        Self::Key(key)
    }
}

impl From<KeyFamily> for Scope {
    fn from(family: KeyFamily) -> Self {
        Self::Family(family)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// An analyze or reanalyze request was accepted.
    AnalysisRequested,
    /// Create or delete changed the collection.
    Mutation,
    /// A watched analysis reached a terminal status.
    Settled,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub scope: Scope,
    pub reason: Reason,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    fetched_at: Instant,
}

pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    events: broadcast::Sender<Invalidation>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh cached value for `key`, if any. Values that no longer decode
    /// as `T` are treated as missing.
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() >= key.stale_time() {
            trace!(?key, "cache entry stale");
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn put<T: Serialize>(&self, key: QueryKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.entries().insert(
                    key,
                    Entry {
                        value,
                        fetched_at: Instant::now(),
                    },
                );
            }
            Err(e) => debug!(?key, error = %e, "value not cacheable"),
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every entry in `scope`, then notify subscribers. Returns the
    /// number of entries removed.
    pub fn invalidate(&self, scope: impl Into<Scope>, reason: Reason) -> usize {
        let scope = scope.into();
        let removed = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|key, _| !scope.matches(key));
            before - entries.len()
        };
        debug!(?scope, ?reason, removed, "cache invalidated");
        // No subscribers is fine.
        let _ = self.events.send(Invalidation { scope, reason });
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.events.subscribe()
    }
}
