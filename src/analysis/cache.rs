//! Verdict cache keyed by transaction fingerprint
//!
//! Only remote-sourced results land here; fallback results are cheap to
//! recompute and would poison later lookups with low-confidence data.
//! Entries expire after a fixed TTL, there is no manual invalidation.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::analysis::types::{AnalysisResult, TransactionDetails};
use crate::config::CacheConfig;

/// Stable hash of the transaction fields that make two submissions "the same
/// transaction". Distinct from the CorrelationToken, which is single-use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(tx: &TransactionDetails) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tx.from_address.as_bytes());
        hasher.update(b"|");
        hasher.update(tx.to_address.as_bytes());
        hasher.update(b"|");
        hasher.update(tx.amount.as_bytes());
        hasher.update(b"|");
        hasher.update(tx.asset.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(tx.signature.as_deref().unwrap_or("").as_bytes());
        Self(hex_string(&hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cached verdict with TTL
#[derive(Clone)]
struct CacheEntry {
    result: AnalysisResult,
    cached_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache statistics for monitoring
#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Fingerprint-keyed verdict cache.
///
/// Writes are last-writer-wins: concurrent identical requests may both score
/// remotely and both write, which is accepted because results for one
/// fingerprint do not diverge meaningfully within the TTL window.
pub struct ScoreCache {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl ScoreCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity(config.max_entries.min(1024)),
            stats: CacheStats::default(),
            config,
        }
    }

    /// Look up a non-expired entry, tagged `cached: true`
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        if !self.config.enabled {
            return None;
        }

        if let Some(entry) = self.entries.get(fingerprint.as_str()) {
            if !entry.is_expired() {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.result.as_cached());
            }
            drop(entry);
            self.entries.remove(fingerprint.as_str());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a remote-sourced result under the fingerprint
    pub fn put(&self, fingerprint: &Fingerprint, result: &AnalysisResult) {
        if !self.config.enabled {
            return;
        }

        // Evict ~10% of entries when over capacity
        if self.entries.len() >= self.config.max_entries {
            let to_remove = (self.config.max_entries / 10).max(1);
            let keys: Vec<_> = self
                .entries
                .iter()
                .take(to_remove)
                .map(|r| r.key().clone())
                .collect();
            for key in keys {
                self.entries.remove(&key);
            }
        }

        self.entries.insert(
            fingerprint.as_str().to_string(),
            CacheEntry {
                result: result.clone(),
                cached_at: Instant::now(),
                ttl: Duration::from_secs(self.config.ttl_secs),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{
        RecommendedAction, ResultSource, RiskLevel, TransactionType,
    };

    fn details(from: &str, to: &str, amount: &str) -> TransactionDetails {
        TransactionDetails {
            from_address: from.into(),
            to_address: to.into(),
            amount: amount.into(),
            asset: None,
            asset_symbol: None,
            signature: None,
            transaction_type: TransactionType::Transfer,
        }
    }

    fn remote_result(score: u8) -> AnalysisResult {
        AnalysisResult {
            score,
            level: RiskLevel::from_score(score),
            confidence: 0.8,
            reasons: Vec::new(),
            factors: Vec::new(),
            recommended_action: RecommendedAction::Approve,
            evidence: serde_json::json!({}),
            sourced_from: ResultSource::Remote,
            cached: false,
        }
    }

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        let a = Fingerprint::of(&details("A", "B", "5"));
        let b = Fingerprint::of(&details("A", "B", "5"));
        let c = Fingerprint::of(&details("A", "B", "6"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_signature_changes_fingerprint() {
        let mut tx = details("A", "B", "5");
        let without = Fingerprint::of(&tx);
        tx.signature = Some("sig".into());
        let with = Fingerprint::of(&tx);
        assert_ne!(without, with);
    }

    #[test]
    fn test_round_trip_tags_cached() {
        let cache = ScoreCache::new(CacheConfig::default());
        let fp = Fingerprint::of(&details("A", "B", "5"));

        assert!(cache.get(&fp).is_none());
        cache.put(&fp, &remote_result(20));

        let hit = cache.get(&fp).unwrap();
        assert_eq!(hit.score, 20);
        assert!(hit.cached);

        let stats = cache.stats();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 1);
        assert_eq!(stats.misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ScoreCache::new(CacheConfig {
            enabled: true,
            ttl_secs: 0,
            max_entries: 16,
        });
        let fp = Fingerprint::of(&details("A", "B", "5"));
        cache.put(&fp, &remote_result(20));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&fp).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = ScoreCache::new(CacheConfig {
            enabled: false,
            ttl_secs: 3_600,
            max_entries: 16,
        });
        let fp = Fingerprint::of(&details("A", "B", "5"));
        cache.put(&fp, &remote_result(20));
        assert!(cache.get(&fp).is_none());
    }
}
