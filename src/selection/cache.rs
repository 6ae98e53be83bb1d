//! Selection result cache with TTL and oldest-first eviction

use super::models::{EnhancedSelectionResult, SelectionContext};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Time source for entry expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyProjection<'a> {
    task: &'a str,
    project_path: &'a Path,
    codebase_size: Option<u64>,
    languages: Option<&'a [String]>,
    optimization: Option<&'a Value>,
}

/// Deterministic key: base64 of the SHA-256 of a JSON projection of the
/// task, project path, codebase size, languages and optimization hints.
///
/// The 44-character digest stands in for the base64 JSON truncated to 50
/// characters, under which tasks sharing a long prefix collided.
pub fn cache_key(context: &SelectionContext) -> String {
    let codebase = context.codebase_context.as_ref();
    let projection = KeyProjection {
        task: &context.task,
        project_path: &context.project_path,
        codebase_size: codebase.map(|c| c.size),
        languages: codebase.map(|c| c.primary_languages.as_slice()),
        optimization: context.optimization.as_ref(),
    };

    // serializing borrowed strings and numbers cannot fail
    let json = serde_json::to_vec(&projection).unwrap_or_default();
    STANDARD.encode(Sha256::digest(&json))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Arc<EnhancedSelectionResult>,
    stored_at: Instant,
}

/// Selection cache
pub struct SelectionCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    evict_count: usize,
    clock: Arc<dyn Clock>,
}

impl SelectionCache {
    pub fn new(ttl: Duration, max_entries: usize, evict_count: usize) -> Self {
        Self::with_clock(ttl, max_entries, evict_count, Arc::new(SystemClock))
    }

    pub fn with_clock(
        ttl: Duration,
        max_entries: usize,
        evict_count: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            evict_count,
            clock,
        }
    }

    /// Fresh entry for `key`; an expired entry is removed
    pub fn get(&self, key: &str) -> Option<Arc<EnhancedSelectionResult>> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?.clone();

        if now.duration_since(entry.stored_at) >= self.ttl {
            self.entries.remove(key);
            debug!("Selection cache entry expired");
            return None;
        }
        Some(entry.result)
    }

    /// Store a result; past `max_entries`, the oldest `evict_count` go
    pub fn insert(&self, key: String, result: Arc<EnhancedSelectionResult>) {
        self.entries.insert(
            key,
            CacheEntry {
                result,
                stored_at: self.clock.now(),
            },
        );

        if self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&self) {
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().stored_at))
            .collect();
        by_age.sort_by_key(|(_, stored_at)| *stored_at);

        for (key, _) in by_age.into_iter().take(self.evict_count) {
            self.entries.remove(&key);
        }
        debug!("Evicted selection cache entries, {} remain", self.entries.len());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
