//! # Feature Cache
//!
//! Bounded, TTL-limited cache of audio features with request dedup.
//!
//! Concurrent lookups of the same track share a single in-flight provider
//! call, keyed by `(track id, cache generation)`. [`FeatureCache::invalidate_all`]
//! advances the generation, so results of calls started before the
//! invalidation are handed to their callers but never stored.

use crate::track::{AudioFeatures, TrackId};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic counter used to tell current results from stale ones.
#[derive(Debug, Default)]
pub struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Start a new generation and return it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

type FeatureFuture = Shared<BoxFuture<'static, Option<AudioFeatures>>>;

#[derive(Debug)]
struct CachedFeatures {
    features: AudioFeatures,
    stored_at: Instant,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<TrackId, CachedFeatures>,
    order: VecDeque<TrackId>,
    in_flight: HashMap<(TrackId, u64), FeatureFuture>,
}

pub struct FeatureCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
    generation: GenerationCounter,
}

impl std::fmt::Debug for FeatureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .field("generation", &self.generation.current())
            .finish()
    }
}

impl FeatureCache {
    /// A capacity of zero disables storage; dedup still applies.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
            ttl,
            generation: GenerationCounter::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// Cached features for `track_id`, dropping the entry if it expired.
    #[must_use]
    pub fn get(&self, track_id: &str) -> Option<AudioFeatures> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(track_id) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.features.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(track_id);
            inner.order.retain(|id| id != track_id);
        }
        None
    }

    /// Store features fetched during `generation`.
    ///
    /// Returns false, storing nothing, when the generation is stale or the
    /// cache is disabled.
    pub fn insert(&self, track_id: &str, features: AudioFeatures, generation: u64) -> bool {
        if self.capacity == 0 || !self.generation.is_current(generation) {
            return false;
        }

        let mut inner = self.lock();
        if inner.entries.contains_key(track_id) {
            inner.order.retain(|id| id != track_id);
        }
        while inner.entries.len() >= self.capacity && !inner.entries.contains_key(track_id) {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        inner.entries.insert(
            track_id.to_string(),
            CachedFeatures {
                features,
                stored_at: Instant::now(),
            },
        );
        inner.order.push_back(track_id.to_string());
        true
    }

    /// Cached features, or the result of `fetch`, shared with every
    /// concurrent caller asking for the same track.
    pub async fn get_or_fetch<F>(&self, track_id: &str, fetch: F) -> Option<AudioFeatures>
    where
        F: FnOnce() -> BoxFuture<'static, Option<AudioFeatures>>,
    {
        if let Some(hit) = self.get(track_id) {
            return Some(hit);
        }

        let generation = self.generation.current();
        let key = (track_id.to_string(), generation);
        let pending = {
            let mut inner = self.lock();
            inner
                .in_flight
                .entry(key.clone())
                .or_insert_with(|| fetch().shared())
                .clone()
        };

        let result = pending.await;
        self.lock().in_flight.remove(&key);

        if let Some(features) = &result {
            if !self.insert(track_id, features.clone(), generation) {
                log::trace!("Not caching features for {track_id} from generation {generation}");
            }
        }
        result
    }

    pub fn invalidate(&self, track_id: &str) {
        let mut inner = self.lock();
        inner.entries.remove(track_id);
        inner.order.retain(|id| id != track_id);
    }

    /// Drop everything and start a new generation.
    pub fn invalidate_all(&self) {
        let generation = self.generation.advance();
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.in_flight.clear();
        log::debug!("Feature cache cleared, generation {generation}");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
