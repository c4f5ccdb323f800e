use super::key::CacheKey;
use super::invalidator::InvalidationSink;
use crate::core::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// LRU-bounded store of selection results keyed by [`CacheKey`].
///
/// Entries have no TTL; they leave the cache only through eviction or an
/// explicit invalidation. Every invalidation bumps the generation, so a
/// reader that fetched before it can tell its result is outdated (see
/// [`SelectionCache::insert_if_current`]).
pub struct SelectionCache<V> {
    entries: Mutex<LruCache<CacheKey, V>>,
    generation: AtomicU64,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V: Clone> SelectionCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            generation: AtomicU64::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let mut entries = self.entries.lock()?;
        let found = entries.get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    pub fn insert(&self, key: CacheKey, value: V) -> Result<()> {
        self.entries.lock()?.put(key, value);
        Ok(())
    }

    /// Generation to pass to [`SelectionCache::insert_if_current`]; read it
    /// before fetching the value.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores `value` unless an invalidation ran since `generation` was read.
    /// Returns whether the value was stored.
    pub fn insert_if_current(&self, key: CacheKey, generation: u64, value: V) -> Result<bool> {
        let mut entries = self.entries.lock()?;
        if self.generation.load(Ordering::Acquire) != generation {
            return Ok(false);
        }
        entries.put(key, value);
        Ok(true)
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.lock()?.contains(key))
    }

    /// Drops every entry covered by `key`. Returns how many were dropped.
    pub fn remove_covered(&self, key: &CacheKey) -> Result<usize> {
        let mut entries = self.entries.lock()?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let covered: Vec<CacheKey> = entries
            .iter()
            .map(|(stored, _)| *stored)
            .filter(|stored| key.covers(stored))
            .collect();
        for stored in &covered {
            entries.pop(stored);
        }
        Ok(covered.len())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<V: Clone + Send + 'static> InvalidationSink for SelectionCache<V> {
    fn name(&self) -> &str {
        "selection-cache"
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.remove_covered(key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::EntityType;

    #[test]
    fn counts_hits_and_misses() {
        let cache = SelectionCache::new(4);
        let key = CacheKey::EntityType(EntityType::Event);

        assert_eq!(cache.get(&key).unwrap(), None::<Vec<String>>);
        cache.insert(key, vec!["music".to_string()]).unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(vec!["music".to_string()]));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn wildcard_clears_everything() {
        let cache = SelectionCache::new(4);
        cache.insert(CacheKey::EntityType(EntityType::Event), 1).unwrap();
        cache.insert(CacheKey::EntityType(EntityType::Person), 2).unwrap();

        assert_eq!(
            cache.remove_covered(&CacheKey::EntityType(EntityType::Event)).unwrap(),
            1
        );
        assert_eq!(cache.remove_covered(&CacheKey::AllEntityTypes).unwrap(), 1);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn fill_after_invalidation_is_refused() {
        let cache = SelectionCache::new(4);
        let key = CacheKey::EntityType(EntityType::Event);

        let before = cache.generation();
        cache.remove_covered(&CacheKey::EntityType(EntityType::Person)).unwrap();
        assert!(!cache.insert_if_current(key, before, 1).unwrap());
        assert!(!cache.contains(&key).unwrap());

        let current = cache.generation();
        assert!(cache.insert_if_current(key, current, 2).unwrap());
        assert_eq!(cache.get(&key).unwrap(), Some(2));
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = SelectionCache::new(1);
        cache.insert(CacheKey::EntityType(EntityType::Event), 1).unwrap();
        cache.insert(CacheKey::EntityType(EntityType::Group), 2).unwrap();
        assert!(!cache.contains(&CacheKey::EntityType(EntityType::Event)).unwrap());
    }
}
