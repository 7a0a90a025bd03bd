//! Read-through cache slots for reference tables.
//!
//! RULE: the engine owns every cache explicitly. Nothing is cached in
//! statics; a slot is a value plus the instant it expires plus the schema
//! version it was loaded under.

use chrono::{DateTime, Duration, Utc};

/// Bump when the shape of a cached reference table changes, so entries
/// loaded under the old shape are never served.
pub const REFERENCE_CACHE_VERSION: &str = "v1";

#[derive(Debug, Clone)]
pub struct Cached<T> {
    entry: Option<CacheEntry<T>>,
    ttl:   Duration,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value:      T,
    version:    String,
    expires_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// The cached value, if present, unexpired at `now`, and stored under
    /// `version`.
    pub fn get(&self, now: DateTime<Utc>, version: &str) -> Option<&T> {
        self.entry
            .as_ref()
            .filter(|e| e.version == version && now < e.expires_at)
            .map(|e| &e.value)
    }

    /// The value stored under `version`, expired or not. Served when a
    /// reload fails.
    pub fn get_stale(&self, version: &str) -> Option<&T> {
        self.entry
            .as_ref()
            .filter(|e| e.version == version)
            .map(|e| &e.value)
    }

    pub fn put(&mut self, value: T, now: DateTime<Utc>, version: &str) {
        self.entry = Some(CacheEntry {
            value,
            version:    version.to_string(),
            expires_at: now + self.ttl,
        });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|e| e.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_expires_after_ttl() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let mut slot = Cached::new(Duration::seconds(600));
        slot.put(7u32, t0, REFERENCE_CACHE_VERSION);

        assert_eq!(slot.get(t0 + Duration::seconds(599), REFERENCE_CACHE_VERSION), Some(&7));
        assert_eq!(slot.get(t0 + Duration::seconds(600), REFERENCE_CACHE_VERSION), None);
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let mut slot = Cached::new(Duration::seconds(600));
        slot.put("rates", t0, "v1");
        assert_eq!(slot.get(t0, "v2"), None);
        slot.invalidate();
        assert_eq!(slot.get(t0, "v1"), None);
    }

    #[test]
    fn stale_read_ignores_expiry_not_version() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let mut slot = Cached::new(Duration::seconds(600));
        slot.put(3u8, t0, "v1");

        assert_eq!(slot.get(t0 + Duration::hours(2), "v1"), None);
        assert_eq!(slot.get_stale("v1"), Some(&3));
        assert_eq!(slot.get_stale("v2"), None);
    }
}
