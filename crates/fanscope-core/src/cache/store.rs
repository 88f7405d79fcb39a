//! Resolved / pending / missing bookkeeping
//!
//! Owned exclusively by the model cache service; no locking.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::models::{ModelBatch, SpectrumModel};
use crate::types::ModelKey;

/// What changed when a batch was applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Keys that became resolved
    pub resolved: Vec<ModelKey>,
    /// Keys newly confirmed missing
    pub missing: Vec<ModelKey>,
    /// Whether the pending set changed
    pub pending_changed: bool,
}

#[derive(Debug, Default)]
pub struct ModelStore {
    resolved: HashMap<ModelKey, Arc<SpectrumModel>>,
    pending: BTreeSet<ModelKey>,
    missing: BTreeSet<ModelKey>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ModelKey) -> Option<&Arc<SpectrumModel>> {
        self.resolved.get(key)
    }

    /// Resolved or permanently missing
    pub fn is_settled(&self, key: &ModelKey) -> bool {
        self.resolved.contains_key(key) || self.missing.contains(key)
    }

    /// Wanted keys that are neither resolved nor missing, in key order
    pub fn unsettled<'a>(&self, wanted: impl IntoIterator<Item = &'a ModelKey>) -> BTreeSet<ModelKey> {
        wanted
            .into_iter()
            .filter(|key| !self.is_settled(key))
            .copied()
            .collect()
    }

    pub fn pending(&self) -> &BTreeSet<ModelKey> {
        &self.pending
    }

    pub fn missing(&self) -> &BTreeSet<ModelKey> {
        &self.missing
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Resolved models among `wanted`
    pub fn models_for<'a>(
        &self,
        wanted: impl IntoIterator<Item = &'a ModelKey>,
    ) -> HashMap<ModelKey, Arc<SpectrumModel>> {
        wanted
            .into_iter()
            .filter_map(|key| self.resolved.get(key).map(|m| (*key, Arc::clone(m))))
            .collect()
    }

    /// Apply a provider response for `requested`
    ///
    /// Models are cached, explicit misses recorded, and every requested key
    /// that is still unsettled afterwards becomes pending.
    pub fn apply(&mut self, requested: &BTreeSet<ModelKey>, batch: ModelBatch) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let pending_before = self.pending.clone();

        for (key, model) in batch.models {
            self.missing.remove(&key);
            self.resolved.insert(key, model);
            outcome.resolved.push(key);
        }
        for key in batch.missing {
            if !self.resolved.contains_key(&key) && self.missing.insert(key) {
                outcome.missing.push(key);
            }
        }

        let (resolved, missing) = (&self.resolved, &self.missing);
        let unsettled = |key: &ModelKey| !resolved.contains_key(key) && !missing.contains(key);
        self.pending.retain(|key| unsettled(key));
        self.pending
            .extend(requested.iter().filter(|key| unsettled(key)).copied());

        outcome.pending_changed = self.pending != pending_before;
        outcome
    }

    /// Keep only pending keys in `wanted`; returns whether any were dropped
    pub fn retain_pending(&mut self, wanted: &BTreeSet<ModelKey>) -> bool {
        let before = self.pending.len();
        self.pending.retain(|key| wanted.contains(key));
        self.pending.len() != before
    }

    /// Forget pending keys (a reset abandons outstanding polls)
    pub fn clear_pending(&mut self) -> bool {
        let changed = !self.pending.is_empty();
        self.pending.clear();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Arc<SpectrumModel> {
        Arc::new(SpectrumModel::default())
    }

    #[test]
    fn test_apply_partitions_requested_keys() {
        let (a, b, c, d) = (
            ModelKey::new(1, 1),
            ModelKey::new(2, 1),
            ModelKey::new(3, 1),
            ModelKey::new(4, 1),
        );
        let mut store = ModelStore::new();
        let requested: BTreeSet<_> = [a, b, c, d].into_iter().collect();
        let outcome = store.apply(
            &requested,
            ModelBatch {
                models: vec![(a, model())],
                missing: vec![b],
                rebuilding: vec![c],
            },
        );

        assert_eq!(outcome.resolved, vec![a]);
        assert_eq!(outcome.missing, vec![b]);
        assert!(outcome.pending_changed);
        assert!(store.is_settled(&a) && store.is_settled(&b));
        assert_eq!(store.pending().iter().copied().collect::<Vec<_>>(), vec![c, d]);
        assert_eq!(store.unsettled(&[a, b, c, d]), [c, d].into_iter().collect());
    }

    #[test]
    fn test_pending_key_resolves_on_later_batch() {
        let a = ModelKey::new(1, 1);
        let mut store = ModelStore::new();
        let requested: BTreeSet<_> = [a].into_iter().collect();
        store.apply(&requested, ModelBatch::default());
        assert!(store.pending().contains(&a));

        let outcome = store.apply(
            &requested,
            ModelBatch {
                models: vec![(a, model())],
                ..Default::default()
            },
        );
        assert!(outcome.pending_changed);
        assert!(store.pending().is_empty());
        assert_eq!(store.models_for(&[a]).len(), 1);
    }

    #[test]
    fn test_retain_pending_drops_unwanted_keys() {
        let (a, b) = (ModelKey::new(1, 1), ModelKey::new(2, 1));
        let mut store = ModelStore::new();
        store.apply(&[a, b].into_iter().collect(), ModelBatch::default());

        assert!(store.retain_pending(&[b].into_iter().collect()));
        assert_eq!(store.pending().iter().copied().collect::<Vec<_>>(), vec![b]);
        assert!(!store.retain_pending(&[b].into_iter().collect()));
        assert!(store.retain_pending(&BTreeSet::new()));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_clear_pending() {
        let a = ModelKey::new(1, 1);
        let mut store = ModelStore::new();
        store.apply(&[a].into_iter().collect(), ModelBatch::default());
        assert!(store.clear_pending());
        assert!(!store.clear_pending());
    }
}
