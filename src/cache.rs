//! TTL-based cache for finished verdicts.

use crate::verdict::ReputationVerdict;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cached verdict.
#[derive(Debug, Clone)]
pub struct CachedVerdict {
    pub verdict: ReputationVerdict,
    /// When this entry was cached.
    pub cached_at: Instant,
    /// TTL for this entry.
    pub ttl: Duration,
}

impl CachedVerdict {
    /// Check if this cache entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache key for one lookup: the input and both mode switches.
pub fn cache_key(ip: &str, fast: bool, score: bool) -> String {
    let material = format!("{}|{}|{}", ip, u8::from(fast), u8::from(score));
    let digest = Sha256::digest(material.as_bytes());
    format!("ip_filter:{}", hex::encode(digest))
}

/// Thread-safe TTL cache of verdicts.
pub struct VerdictCache {
    cache: RwLock<HashMap<String, CachedVerdict>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl VerdictCache {
    /// Create a new verdict cache.
    pub fn new(default_ttl_seconds: u64, max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            default_ttl: Duration::from_secs(default_ttl_seconds),
            max_entries,
        }
    }

    /// Get a cached verdict if available and not expired.
    pub fn get(&self, key: &str) -> Option<ReputationVerdict> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(key)?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.verdict.clone())
        }
    }

    /// Store a verdict with the default TTL.
    pub fn set(&self, key: String, verdict: ReputationVerdict) {
        self.set_with_ttl(key, verdict, self.default_ttl);
    }

    /// Store a verdict with a custom TTL.
    pub fn set_with_ttl(&self, key: String, verdict: ReputationVerdict, ttl: Duration) {
        let entry = CachedVerdict {
            verdict,
            cached_at: Instant::now(),
            ttl,
        };

        if let Ok(mut cache) = self.cache.write() {
            if cache.len() >= self.max_entries && !cache.contains_key(&key) {
                cache.retain(|_, v| !v.is_expired());

                // Still full: drop the oldest entry
                if cache.len() >= self.max_entries {
                    if let Some(oldest) = cache
                        .iter()
                        .min_by_key(|(_, v)| v.cached_at)
                        .map(|(k, _)| k.clone())
                    {
                        cache.remove(&oldest);
                    }
                }
            }

            cache.insert(key, entry);
        }
    }

    /// Remove expired entries from the cache.
    pub fn cleanup(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, v| !v.is_expired());
        }
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
