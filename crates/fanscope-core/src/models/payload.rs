//! Batched model responses

use std::sync::Arc;

use super::spectrum::SpectrumModel;
use crate::types::ModelKey;

/// Result of one batched model fetch
///
/// Keys requested but absent from all three lists are still being prepared
/// by the provider and count as pending.
#[derive(Debug, Clone, Default)]
pub struct ModelBatch {
    pub models: Vec<(ModelKey, Arc<SpectrumModel>)>,
    pub missing: Vec<ModelKey>,
    pub rebuilding: Vec<ModelKey>,
}
