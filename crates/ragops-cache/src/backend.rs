use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use ragops_core::error::Result;
use ragops_core::traits::CacheBackend;

struct Slot {
    value: String,
    expires_at: Instant,
    seq: u64,
}

/// In-process TTL store. Expired keys are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCacheBackend {
    slots: DashMap<String, Slot>,
    seq: AtomicU64,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|s| s.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now().checked_add(ttl).unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64));
        self.slots.insert(key.to_string(), Slot { value, expires_at, seq });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        if let Some(slot) = self.slots.get(key) {
            if slot.expires_at > now {
                return Ok(Some(slot.value.clone()));
            }
        }
        self.slots.remove_if(key, |_, s| s.expires_at <= now);
        Ok(None)
    }

    async fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<(u64, String)> = self
            .slots
            .iter()
            .filter(|s| s.key().starts_with(prefix) && s.expires_at > now)
            .map(|s| (s.seq, s.key().clone()))
            .collect();
        keys.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        if let Some(limit) = limit {
            keys.truncate(limit);
        }
        Ok(keys.into_iter().map(|(_, k)| k).collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        Ok(keys.iter().filter(|k| self.slots.remove(k.as_str()).is_some()).count())
    }
}
