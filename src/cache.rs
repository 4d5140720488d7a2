//! Process-wide memo of computed summaries.
//!
//! Keyed by the exact `(collection, file, topic)` triple of a request. The
//! eviction policy is fixed at construction: [`EvictionPolicy::Never`]
//! keeps every summary until the process exits, and
//! [`EvictionPolicy::MaxEntries`] drops the oldest insertion once full.
//! Entries are never invalidated by ingestion; re-ingested files are only
//! reflected after a restart or [`SummaryCache::clear`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::dispatch::SummaryRequest;
use crate::points::Summary;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub collection: String,
    pub file: String,
    pub topic: String,
}

impl From<&SummaryRequest> for SummaryKey {
    fn from(req: &SummaryRequest) -> Self {
        Self {
            collection: req.collection.clone(),
            file: req.file.clone(),
            topic: req.topic.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Never,
    /// Keep at most this many entries, evicting oldest-inserted first.
    MaxEntries(usize),
}

#[derive(Default)]
struct Entries {
    map: HashMap<SummaryKey, Arc<Summary>>,
    order: VecDeque<SummaryKey>,
}

pub struct SummaryCache {
    policy: EvictionPolicy,
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Counters reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl SummaryCache {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(Entries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // a panic while holding the lock cannot leave the map half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &SummaryKey) -> Option<Arc<Summary>> {
        let found = self.lock().map.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: SummaryKey, summary: Arc<Summary>) {
        let mut entries = self.lock();
        if entries.map.insert(key.clone(), summary).is_none() {
            entries.order.push_back(key);
        }
        if let EvictionPolicy::MaxEntries(max) = self.policy {
            while entries.map.len() > max.max(1) {
                match entries.order.pop_front() {
                    Some(oldest) => {
                        entries.map.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
