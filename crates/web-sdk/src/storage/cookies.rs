//! Cookie backend. Cookies are scoped to the registrable domain so every
//! subdomain of the site sees the same referral.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use parking_lot::Mutex;
use time::OffsetDateTime;

use pushlap_core::types::StorageKind;

use super::{expiry, AffiliateStorage, Clock};
use crate::debug_log;
use crate::logging::DebugLog;

const PROBE_COOKIE: &str = "plg_test";
/// 9999-12-31T23:59:59Z, the latest date an `Expires` attribute can carry.
const MAX_COOKIE_EXPIRY_SECS: i64 = 253_402_300_799;

/// Host access to the page's cookie string, with `document.cookie` semantics:
/// `read` returns `name=value` pairs joined by `"; "`, and `write` applies a
/// single `Set-Cookie`-style line.
pub trait CookieBackend: Send + Sync {
    fn read(&self) -> anyhow::Result<String>;

    fn write(&self, line: &str) -> anyhow::Result<()>;
}

/// Registrable domain (eTLD+1) of `hostname`. `localhost`, IP addresses and
/// names the public suffix list cannot split are returned unchanged.
pub fn root_domain(hostname: &str) -> String {
    if hostname == "localhost" || hostname.parse::<IpAddr>().is_ok() {
        return hostname.to_string();
    }
    let lower = hostname.to_lowercase();
    psl::domain(lower.as_bytes())
        .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
        .map(|s| s.to_string())
        .unwrap_or(lower)
}

pub struct CookieStorage {
    backend: Arc<dyn CookieBackend>,
    domain: String,
    clock: Arc<dyn Clock>,
    log: DebugLog,
}

impl CookieStorage {
    pub fn new(
        backend: Arc<dyn CookieBackend>,
        hostname: &str,
        clock: Arc<dyn Clock>,
        log: DebugLog,
    ) -> Self {
        Self {
            backend,
            domain: root_domain(hostname),
            clock,
            log,
        }
    }

    /// Cookie domain attribute used for every write.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Write, read back and expire a probe cookie.
    pub fn is_available(&self) -> bool {
        let probe = || -> anyhow::Result<bool> {
            self.backend
                .write(&format!("{PROBE_COOKIE}=1; SameSite=Lax"))?;
            let enabled = self.backend.read()?.contains(&format!("{PROBE_COOKIE}="));
            self.backend.write(&format!(
                "{PROBE_COOKIE}=1; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/;"
            ))?;
            Ok(enabled)
        };
        probe().unwrap_or(false)
    }

    fn line(&self, name: &str, value: &str, expires: OffsetDateTime) -> String {
        Cookie::build((name.to_string(), value.to_string()))
            .expires(expires)
            .path("/")
            .domain(format!(".{}", self.domain))
            .same_site(SameSite::None)
            .secure(true)
            .build()
            .encoded()
            .to_string()
    }

    fn write(&self, line: &str) {
        if let Err(e) = self.backend.write(line) {
            debug_log!(self.log, error = %e, "cookie write failed");
        }
    }
}

impl AffiliateStorage for CookieStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Cookies
    }

    fn set(&self, name: &str, value: &str, days: i64) {
        let secs = expiry(self.clock.now(), days)
            .timestamp()
            .clamp(0, MAX_COOKIE_EXPIRY_SECS);
        let expires =
            OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let line = self.line(name, value, expires);
        self.write(&line);
    }

    fn get(&self, name: &str) -> Option<String> {
        let jar = self.backend.read().ok()?;
        Cookie::split_parse_encoded(jar)
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    fn delete(&self, name: &str) {
        let line = self.line(name, "", OffsetDateTime::UNIX_EPOCH);
        self.write(&line);
    }
}

#[derive(Debug, Clone)]
struct StoredCookie {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
}

/// In-memory cookie jar for a single host with `document.cookie` semantics:
/// domain attributes must match the host, past expiry deletes, and reads
/// skip expired entries.
pub struct MemoryCookieJar {
    hostname: String,
    clock: Arc<dyn Clock>,
    enabled: bool,
    cookies: Mutex<Vec<StoredCookie>>,
}

impl MemoryCookieJar {
    pub fn new(hostname: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hostname: hostname.into().to_lowercase(),
            clock,
            enabled: true,
            cookies: Mutex::new(Vec::new()),
        }
    }

    /// A jar that silently drops every write, like a browser with cookies
    /// blocked.
    pub fn disabled(hostname: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: false,
            ..Self::new(hostname, clock)
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.cookies
            .lock()
            .iter()
            .filter(|c| c.expires.map_or(true, |e| e > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn domain_matches(&self, domain: &str) -> bool {
        let domain = domain.trim_start_matches('.').to_lowercase();
        self.hostname == domain || self.hostname.ends_with(&format!(".{domain}"))
    }
}

impl CookieBackend for MemoryCookieJar {
    fn read(&self) -> anyhow::Result<String> {
        let now = self.clock.now();
        let cookies = self.cookies.lock();
        Ok(cookies
            .iter()
            .filter(|c| c.expires.map_or(true, |e| e > now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn write(&self, line: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let parsed = Cookie::parse(line.to_string())?;
        if let Some(domain) = parsed.domain() {
            if !self.domain_matches(domain) {
                // Browsers drop cookies for foreign domains without an error
                return Ok(());
            }
        }

        let expires = parsed
            .expires_datetime()
            .and_then(|e| DateTime::<Utc>::from_timestamp(e.unix_timestamp(), 0));
        let mut cookies = self.cookies.lock();
        cookies.retain(|c| c.name != parsed.name());
        if expires.map_or(true, |e| e > self.clock.now()) {
            cookies.push(StoredCookie {
                name: parsed.name().to_string(),
                value: parsed.value().to_string(),
                expires,
            });
        }
        Ok(())
    }
}
