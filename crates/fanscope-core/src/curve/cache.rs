//! Bounded per-model point cache
//!
//! Queries are quantised to three decimals; the quantised value is both the
//! cache key and the point actually evaluated, so a cached result never
//! depends on which nearby query arrived first.
//!
//! Eviction is least-recently-used. Each entry carries the tick of its last
//! access; hits are O(1) and a full cache pays one O(capacity) scan per
//! insertion.

use std::collections::HashMap;

use super::pchip::PiecewiseModel;

/// Default number of cached points per model
pub const DEFAULT_POINT_CACHE_CAPACITY: usize = 256;

/// Query resolution: keys are thousandths of the x unit
const KEY_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    last_used: u64,
}

/// LRU cache of evaluated points for a single model
#[derive(Debug, Clone)]
pub struct PointCache {
    capacity: usize,
    entries: HashMap<i64, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl PointCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Quantise a query to the cache resolution
    ///
    /// Returns the key and the rounded query value.
    #[inline]
    pub fn quantise(x: f64) -> (i64, f64) {
        let key = (x * KEY_SCALE).round() as i64;
        (key, key as f64 / KEY_SCALE)
    }

    /// Evaluate `model` at `x` through the cache
    ///
    /// The cache must only ever be used with one model; callers key their
    /// caches by model identity.
    pub fn evaluate(&mut self, model: &PiecewiseModel, x: f64) -> f64 {
        if !x.is_finite() {
            return model.evaluate(x);
        }
        let (key, rounded) = Self::quantise(x);
        self.get_or_insert_with(key, || model.evaluate(rounded))
    }

    fn get_or_insert_with(&mut self, key: i64, compute: impl FnOnce() -> f64) -> f64 {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = tick;
            self.hits += 1;
            return entry.value;
        }

        self.misses += 1;
        let value = compute();
        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                last_used: tick,
            },
        );
        value
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    fn contains(&self, x: f64) -> bool {
        self.entries.contains_key(&Self::quantise(x).0)
    }
}

impl Default for PointCache {
    fn default() -> Self {
        Self::new(DEFAULT_POINT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> PiecewiseModel {
        PiecewiseModel::new(vec![0.0, 10.0], vec![0.0, 10.0], vec![1.0, 1.0])
    }

    #[test]
    fn test_quantised_queries_share_an_entry() {
        let model = line();
        let mut cache = PointCache::new(8);
        let a = cache.evaluate(&model, 1.0001);
        let b = cache.evaluate(&model, 0.9996);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_cached_value_matches_rounded_evaluation() {
        let model = line();
        let mut cache = PointCache::default();
        assert_eq!(cache.evaluate(&model, 2.34567), model.evaluate(2.346));
    }

    #[test]
    fn test_bounded_capacity() {
        let model = line();
        let mut cache = PointCache::new(4);
        for i in 0..20 {
            cache.evaluate(&model, i as f64 * 0.1);
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let model = line();
        let mut cache = PointCache::new(3);
        cache.evaluate(&model, 1.0);
        cache.evaluate(&model, 2.0);
        cache.evaluate(&model, 3.0);
        // Touch 1.0 so 2.0 becomes the oldest
        cache.evaluate(&model, 1.0);
        cache.evaluate(&model, 4.0);

        assert!(cache.contains(1.0));
        assert!(!cache.contains(2.0));
        assert!(cache.contains(3.0));
        assert!(cache.contains(4.0));
    }

    #[test]
    fn test_non_finite_query_bypasses_cache() {
        let model = line();
        let mut cache = PointCache::new(3);
        assert!(cache.evaluate(&model, f64::NAN).is_nan());
        assert!(cache.is_empty());
    }
}
