//! Render cache with in-flight request coalescing
//!
//! Maps a [`CacheKey`] to a finished, shared [`RenderedBuffer`]. The first
//! caller to miss on a key installs a pending slot and renders outside the
//! map lock; callers arriving while that render is running block on the
//! slot and receive the same result, so each key is computed at most once
//! at a time. Failed renders are never stored.
//!
//! Entries are never rewritten. A palette swap produces new keys (the
//! generation is part of the key), and handles returned earlier keep their
//! buffer alive through the `Arc` even after eviction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::bitmap::RenderedBuffer;
use crate::error::RenderError;
use crate::filters::{self, Filter};

/// Identity of one render result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sprite: String,
    pub generation: u64,
    /// Canonical filter chain signature, see [`filters::signature`]
    pub filters: String,
}

impl CacheKey {
    pub fn new(sprite: impl Into<String>, generation: u64, filters: &[Filter]) -> Self {
        Self { sprite: sprite.into(), generation, filters: filters::signature(filters) }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filters.is_empty() {
            write!(f, "{}@{}", self.sprite, self.generation)
        } else {
            write!(f, "{}@{}[{}]", self.sprite, self.generation, self.filters)
        }
    }
}

/// When stored entries are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Keep everything (sprite catalogs are usually small and fixed)
    #[default]
    Unbounded,
    /// Drop least recently used entries while total pixel bytes exceed the cap
    Lru { max_bytes: usize },
    /// Drop entries older than `ttl`
    Ttl { ttl: Duration },
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total lookups
    pub lookups: u64,
    /// Served from a stored entry
    pub hits: u64,
    /// Started a new render
    pub misses: u64,
    /// Waited on another caller's in-flight render
    pub coalesced: u64,
    /// Renders stored
    pub insertions: u64,
    /// Entries dropped by the eviction policy
    pub evictions: u64,
    /// Renders that failed (and were not stored)
    pub failures: u64,
}

impl CacheStats {
    /// Fraction of lookups that did not start a render (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.hits + self.coalesced) as f64 / self.lookups as f64
        }
    }
}

type Outcome = Result<Arc<RenderedBuffer>, RenderError>;

/// A render in progress that other callers can wait on.
#[derive(Debug, Default)]
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl InFlight {
    fn wait(&self) -> Outcome {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            outcome = self.done.wait(outcome).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self, result: Outcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.done.notify_all();
    }
}

#[derive(Debug)]
struct Entry {
    buffer: Arc<RenderedBuffer>,
    created_at: Instant,
    last_accessed: Instant,
}

#[derive(Debug)]
enum Slot {
    Ready(Entry),
    Pending(Arc<InFlight>),
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<CacheKey, Slot>,
    size_bytes: usize,
    stats: CacheStats,
}

impl Inner {
    fn remove_ready(&mut self, key: &CacheKey) -> bool {
        match self.slots.get(key) {
            Some(Slot::Ready(_)) => {}
            _ => return false,
        }
        if let Some(Slot::Ready(entry)) = self.slots.remove(key) {
            self.size_bytes = self.size_bytes.saturating_sub(entry.buffer.byte_len());
        }
        true
    }
}

/// Thread-safe render cache.
#[derive(Debug, Default)]
pub struct RenderCache {
    policy: EvictionPolicy,
    inner: Mutex<Inner>,
}

impl RenderCache {
    /// Create an unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self { policy, inner: Mutex::new(Inner::default()) }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Return the buffer stored under `key`, rendering it with `render` on a miss.
    ///
    /// `render` runs without the cache lock held and at most once per key at
    /// a time; concurrent callers for the same key wait for it. If `render`
    /// fails, nothing is stored and waiters see the failure. A `Cancelled`
    /// outcome (or a panic) belongs to the caller that rendered: waiters
    /// retry instead, and one of them renders in its place.
    pub fn get_or_render<F>(&self, key: &CacheKey, render: F) -> Outcome
    where
        F: FnOnce() -> Result<RenderedBuffer, RenderError>,
    {
        let flight = loop {
            let waiting = {
                let mut guard = self.lock();
                let inner = &mut *guard;
                inner.stats.lookups += 1;
                let now = Instant::now();

                match inner.slots.get_mut(key) {
                    Some(Slot::Ready(entry)) if !self.is_expired(entry, now) => {
                        entry.last_accessed = now;
                        inner.stats.hits += 1;
                        tracing::debug!(key = %key, "render cache hit");
                        return Ok(Arc::clone(&entry.buffer));
                    }
                    Some(Slot::Pending(flight)) => {
                        inner.stats.coalesced += 1;
                        Arc::clone(flight)
                    }
                    slot => {
                        if slot.is_some() {
                            inner.remove_ready(key);
                            inner.stats.evictions += 1;
                        }
                        inner.stats.misses += 1;
                        let flight = Arc::new(InFlight::default());
                        inner.slots.insert(key.clone(), Slot::Pending(Arc::clone(&flight)));
                        tracing::debug!(key = %key, "render cache miss");
                        break flight;
                    }
                }
            };

            tracing::debug!(key = %key, "waiting on in-flight render");
            match waiting.wait() {
                Err(RenderError::Cancelled(_)) => {
                    tracing::debug!(key = %key, "in-flight render abandoned, retrying");
                }
                outcome => return outcome,
            }
        };

        let mut pending = PendingGuard { cache: self, key, flight: &flight, finished: false };
        let outcome = render().map(Arc::new);
        pending.finish(outcome.clone());
        outcome
    }

    /// Look up a stored entry without rendering or touching statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<RenderedBuffer>> {
        match self.lock().slots.get(key) {
            Some(Slot::Ready(entry)) => Some(Arc::clone(&entry.buffer)),
            _ => None,
        }
    }

    /// Drop every stored entry whose generation differs from `generation`.
    ///
    /// Returns the number of entries removed. In-flight renders are left alone.
    pub fn retain_generation(&self, generation: u64) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let stale: Vec<CacheKey> = inner
            .slots
            .iter()
            .filter(|(k, slot)| k.generation != generation && matches!(slot, Slot::Ready(_)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            inner.remove_ready(key);
        }
        inner.stats.evictions += stale.len() as u64;
        stale.len()
    }

    /// Drop all stored entries. In-flight renders still complete and are stored.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.slots.retain(|_, slot| matches!(slot, Slot::Pending(_)));
        guard.size_bytes = 0;
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().slots.values().filter(|s| matches!(s, Slot::Ready(_))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total pixel bytes held by stored entries.
    pub fn size_bytes(&self) -> usize {
        self.lock().size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        match self.policy {
            EvictionPolicy::Ttl { ttl } => now.duration_since(entry.created_at) >= ttl,
            _ => false,
        }
    }

    fn store(&self, key: &CacheKey, buffer: Arc<RenderedBuffer>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        inner.size_bytes += buffer.byte_len();
        inner.slots.insert(
            key.clone(),
            Slot::Ready(Entry { buffer, created_at: now, last_accessed: now }),
        );
        inner.stats.insertions += 1;
        self.evict(inner, key, now);
    }

    /// Apply the eviction policy, never dropping `keep` (the entry just stored).
    fn evict(&self, inner: &mut Inner, keep: &CacheKey, now: Instant) {
        let victims: Vec<CacheKey> = match self.policy {
            EvictionPolicy::Unbounded => Vec::new(),
            EvictionPolicy::Ttl { .. } => inner
                .slots
                .iter()
                .filter(|(k, slot)| {
                    *k != keep && matches!(slot, Slot::Ready(e) if self.is_expired(e, now))
                })
                .map(|(k, _)| k.clone())
                .collect(),
            EvictionPolicy::Lru { max_bytes } => {
                let mut ready: Vec<(&CacheKey, Instant, usize)> = inner
                    .slots
                    .iter()
                    .filter(|(k, _)| *k != keep)
                    .filter_map(|(k, slot)| match slot {
                        Slot::Ready(e) => Some((k, e.last_accessed, e.buffer.byte_len())),
                        Slot::Pending(_) => None,
                    })
                    .collect();
                ready.sort_by_key(|(_, accessed, _)| *accessed);

                let mut size = inner.size_bytes;
                let mut victims = Vec::new();
                for (key, _, bytes) in ready {
                    if size <= max_bytes {
                        break;
                    }
                    size = size.saturating_sub(bytes);
                    victims.push(key.clone());
                }
                victims
            }
        };

        for key in &victims {
            inner.remove_ready(key);
            tracing::debug!(key = %key, "evicted render");
        }
        inner.stats.evictions += victims.len() as u64;
    }

    fn abandon(&self, key: &CacheKey) {
        let mut guard = self.lock();
        if matches!(guard.slots.get(key), Some(Slot::Pending(_))) {
            guard.slots.remove(key);
        }
        guard.stats.failures += 1;
    }
}

/// Resolves a pending slot exactly once, even if the render panics.
struct PendingGuard<'a> {
    cache: &'a RenderCache,
    key: &'a CacheKey,
    flight: &'a Arc<InFlight>,
    finished: bool,
}

impl PendingGuard<'_> {
    fn finish(&mut self, outcome: Outcome) {
        match &outcome {
            Ok(buffer) => self.cache.store(self.key, Arc::clone(buffer)),
            Err(err) => {
                tracing::debug!(key = %self.key, error = %err, "render failed, not cached");
                self.cache.abandon(self.key);
            }
        }
        self.flight.complete(outcome);
        self.finished = true;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.abandon(self.key);
            self.flight.complete(Err(RenderError::Cancelled(self.key.sprite.clone())));
        }
    }
}
