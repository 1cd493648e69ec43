//! Storage shim — persists the referral identifiers across page views.
//!
//! Two implementations sit behind [`AffiliateStorage`]: root-domain cookies
//! ([`CookieStorage`]) and an expiring key/value store ([`LocalStorage`]).
//! [`select_storage`] probes both once at initialization; the key/value store
//! is used only when cookies are unavailable and it is available.

pub mod cookies;
pub mod local;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use pushlap_core::types::StorageKind;

pub use self::cookies::{root_domain, CookieBackend, CookieStorage, MemoryCookieJar};
pub use self::local::{KeyValueBackend, LocalStorage, MemoryKeyValueStore};

/// Name/value persistence with per-entry expiry in days. Backend failures are
/// swallowed: reads yield `None`, writes and deletes become no-ops.
pub trait AffiliateStorage: Send + Sync {
    fn kind(&self) -> StorageKind;

    fn set(&self, name: &str, value: &str, days: i64);

    fn get(&self, name: &str) -> Option<String>;

    fn delete(&self, name: &str);
}

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replay.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// `now + days`, saturating instead of overflowing.
pub(crate) fn expiry(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    chrono::Duration::try_days(days)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(if days < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

/// Storage keys for one program's referral state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralKeys {
    pub ref_key: String,
    pub click_id_key: String,
}

impl ReferralKeys {
    pub fn for_program(program_id: &str) -> Self {
        Self {
            ref_key: format!("{program_id}_affiliate_ref"),
            click_id_key: format!("{program_id}_affiliate_referral"),
        }
    }
}

/// Pick the backend for this page: cookies unless they are unavailable and
/// the key/value store works.
pub fn select_storage(cookies: CookieStorage, local: LocalStorage) -> Arc<dyn AffiliateStorage> {
    let use_local = !cookies.is_available() && local.is_available();
    let storage: Arc<dyn AffiliateStorage> = if use_local {
        Arc::new(local)
    } else {
        Arc::new(cookies)
    };
    debug!(storage = %storage.kind(), "storage backend selected");
    storage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DebugLog;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_referral_keys() {
        let keys = ReferralKeys::for_program("prog-9");
        assert_eq!(keys.ref_key, "prog-9_affiliate_ref");
        assert_eq!(keys.click_id_key, "prog-9_affiliate_referral");
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(expiry(now, 2), Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap());
        assert_eq!(expiry(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry(now, i64::MIN), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_selects_cookies_when_enabled() {
        let clock = clock();
        let jar = Arc::new(MemoryCookieJar::new("shop.example.com", clock.clone()));
        let kv = Arc::new(MemoryKeyValueStore::new());
        let storage = select_storage(
            CookieStorage::new(jar, "shop.example.com", clock.clone(), DebugLog::default()),
            LocalStorage::new(kv, clock, DebugLog::default()),
        );
        assert_eq!(storage.kind(), StorageKind::Cookies);
    }

    #[test]
    fn test_falls_back_to_local_storage() {
        let clock = clock();
        let jar = Arc::new(MemoryCookieJar::disabled("shop.example.com", clock.clone()));
        let kv = Arc::new(MemoryKeyValueStore::new());
        let storage = select_storage(
            CookieStorage::new(jar, "shop.example.com", clock.clone(), DebugLog::default()),
            LocalStorage::new(kv, clock, DebugLog::default()),
        );
        assert_eq!(storage.kind(), StorageKind::LocalStorage);
    }

    #[test]
    fn test_keeps_cookies_when_nothing_works() {
        let clock = clock();
        let jar = Arc::new(MemoryCookieJar::disabled("shop.example.com", clock.clone()));
        let kv = Arc::new(MemoryKeyValueStore::unavailable());
        let storage = select_storage(
            CookieStorage::new(jar, "shop.example.com", clock.clone(), DebugLog::default()),
            LocalStorage::new(kv, clock, DebugLog::default()),
        );
        assert_eq!(storage.kind(), StorageKind::Cookies);
        storage.set("k", "v", 1);
        assert_eq!(storage.get("k"), None);
    }
}
