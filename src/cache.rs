use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Upper bound on stored pages unless configured otherwise.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Rendered page bodies with a fixed time to live.
///
/// A zero TTL disables caching entirely. When full, the oldest page is
/// evicted to make room.
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedPage>>,
}

struct CachedPage {
    body: String,
    stored_at: Instant,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|page| page.stored_at.elapsed() < self.ttl)
            .map(|page| page.body.clone())
    }

    pub async fn insert(&self, key: String, body: String) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, page| page.stored_at.elapsed() < ttl);
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, page)| page.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(key = %oldest, "evicting cached page");
                entries.remove(&oldest);
            }
        }
        debug!(key = %key, "caching rendered page");
        entries.insert(
            key,
            CachedPage {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
