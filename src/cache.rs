use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
struct Entry {
    page: CachedPage,
    stored_at: Instant,
}

/// Rendered-output cache keyed by route and query string. Entries live for a
/// fixed TTL and are never refreshed by data changes; `invalidate`/`clear` are
/// the only early exits. Every `put` sweeps expired entries, so the map holds
/// at most the keys written within one TTL.
#[derive(Clone)]
pub struct PageCache {
    entries: Arc<DashMap<String, Entry>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(DashMap::new()), ttl }
    }

    pub fn key(path: &str, query: &str) -> String {
        format!("{path}?{query}")
    }

    pub fn get(&self, key: &str) -> Option<CachedPage> {
        let fresh = {
            let entry = self.entries.get(key)?;
            (entry.stored_at.elapsed() < self.ttl).then(|| entry.page.clone())
        };
        if fresh.is_none() {
            self.entries.remove_if(key, |_, e| e.stored_at.elapsed() >= self.ttl);
        }
        fresh
    }

    pub fn put(&self, key: String, body: Vec<u8>, content_type: &str) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        let page = CachedPage { body, content_type: content_type.to_string() };
        self.entries.insert(key, Entry { page, stored_at: Instant::now() });
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
