//! Key/value backend used when cookies are blocked. Entries carry their own
//! expiry timestamp since the store has none.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use pushlap_core::types::StorageKind;

use super::{expiry, AffiliateStorage, Clock};
use crate::debug_log;
use crate::logging::DebugLog;

const PROBE_KEY: &str = "plg_ls_test";

/// Host access to a `window.localStorage`-like string store.
pub trait KeyValueBackend: Send + Sync {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// Serialized form of one entry: `{"value": .., "expires": <epoch ms>}`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<i64>,
}

pub struct LocalStorage {
    backend: Arc<dyn KeyValueBackend>,
    clock: Arc<dyn Clock>,
    log: DebugLog,
}

impl LocalStorage {
    pub fn new(backend: Arc<dyn KeyValueBackend>, clock: Arc<dyn Clock>, log: DebugLog) -> Self {
        Self {
            backend,
            clock,
            log,
        }
    }

    /// Set and remove a probe key.
    pub fn is_available(&self) -> bool {
        self.backend
            .set_item(PROBE_KEY, "1")
            .and_then(|_| self.backend.remove_item(PROBE_KEY))
            .is_ok()
    }
}

impl AffiliateStorage for LocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::LocalStorage
    }

    fn set(&self, name: &str, value: &str, days: i64) {
        let entry = StoredEntry {
            value: value.to_string(),
            expires: Some(expiry(self.clock.now(), days).timestamp_millis()),
        };
        let result = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.backend.set_item(name, &json));
        if let Err(e) = result {
            debug_log!(self.log, error = %e, key = name, "localStorage setItem failed");
        }
    }

    fn get(&self, name: &str) -> Option<String> {
        let raw = self.backend.get_item(name).ok()??;
        let entry: StoredEntry = serde_json::from_str(&raw).ok()?;
        if let Some(expires) = entry.expires {
            if self.clock.now().timestamp_millis() > expires {
                self.delete(name);
                return None;
            }
        }
        Some(entry.value)
    }

    fn delete(&self, name: &str) {
        if let Err(e) = self.backend.remove_item(name) {
            debug_log!(self.log, error = %e, key = name, "localStorage removeItem failed");
        }
    }
}

/// In-memory key/value store.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    items: DashMap<String, String>,
    unavailable: bool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation fails, like storage in a sandboxed
    /// frame or with the quota at zero.
    pub fn unavailable() -> Self {
        Self {
            items: DashMap::new(),
            unavailable: true,
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.unavailable {
            anyhow::bail!("QuotaExceededError: storage is unavailable");
        }
        Ok(())
    }
}

impl KeyValueBackend for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.check()?;
        Ok(self.raw(key))
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.check()?;
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.check()?;
        self.items.remove(key);
        Ok(())
    }
}
