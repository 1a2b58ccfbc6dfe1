//! Read-through cache with a fixed time-to-live.
//!
//! Entries expire on their own; writers call `invalidate` after every
//! mutation that could change a cached value.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct Slots<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Bumped by every `invalidate`; a load that straddles one is not stored
    generations: HashMap<K, u64>,
}

impl<K: Eq + Hash, V> Slots<K, V> {
    fn generation(&self, key: &K) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    slots: RwLock<Slots<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(Slots {
                entries: HashMap::new(),
                generations: HashMap::new(),
            }),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now()).await
    }

    async fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let slots = self.slots.read().await;
        slots
            .entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.inserted_at) < self.ttl)
            .map(|entry| entry.value.clone())
    }

    #[cfg(test)]
    async fn insert_at(&self, key: K, value: V, inserted_at: Instant) {
        let mut slots = self.slots.write().await;
        slots.entries.insert(key, Entry { value, inserted_at });
    }

    /// Return the cached value or load, store and return a fresh one.
    /// Load errors are passed through and nothing is cached. A value whose
    /// key was invalidated while it loaded is returned but not stored.
    pub async fn get_or_try_insert_with<E, F, Fut>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }
        let started = self.slots.read().await.generation(&key);
        let value = load().await?;

        let mut slots = self.slots.write().await;
        if slots.generation(&key) == started {
            let entry = Entry {
                value: value.clone(),
                inserted_at: Instant::now(),
            };
            slots.entries.insert(key, entry);
        }
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        let mut slots = self.slots.write().await;
        slots.entries.remove(key);
        let next = slots.generation(key) + 1;
        slots.generations.insert(key.clone(), next);
    }

    /// Drop expired entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.entries.len();
        slots
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < self.ttl);
        before - slots.entries.len()
    }
}
