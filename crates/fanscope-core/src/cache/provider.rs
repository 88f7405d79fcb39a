//! Model providers
//!
//! The provider is the external collaborator that stores and serves spectrum
//! models. [`DirectoryModelProvider`] reads the on-disk cache files written
//! by the model builder:
//!
//! ```text
//! {dir}/{entity}_{condition}_spectrum.json
//! {"type": "spectrum_v2", "model": {...}, "meta": {...}}
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::FetchError;
use crate::models::{ModelBatch, SpectrumModel};
use crate::types::ModelKey;

/// Source of spectrum models
///
/// Keys absent from all three lists of the returned batch are treated as
/// still being prepared and will be polled again.
pub trait ModelProvider: Send + Sync + 'static {
    fn fetch_models(
        &self,
        keys: Vec<ModelKey>,
    ) -> impl Future<Output = Result<ModelBatch, FetchError>> + Send;
}

const SPECTRUM_FILE_TYPES: [&str; 2] = ["spectrum_v1", "spectrum_v2"];

/// On-disk envelope of a cached spectrum model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub model: SpectrumModel,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl SpectrumFile {
    pub fn new(key: ModelKey, model: SpectrumModel) -> Self {
        Self {
            kind: "spectrum_v2".to_string(),
            model,
            meta: serde_json::json!({
                "model_id": key.entity_id,
                "condition_id": key.condition_id,
            }),
        }
    }

    pub fn has_known_type(&self) -> bool {
        SPECTRUM_FILE_TYPES.contains(&self.kind.as_str())
    }
}

/// Outcome of reading one cache file
enum FileState {
    Ready(SpectrumModel),
    NotBuilt,
    Invalid(String),
}

/// Serves models from a directory of spectrum cache files
///
/// An absent file means the model hasn't been built yet (pending); a file
/// that can't be parsed or has the wrong structure is permanently missing.
#[derive(Debug, Clone)]
pub struct DirectoryModelProvider {
    dir: PathBuf,
}

impl DirectoryModelProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: ModelKey) -> PathBuf {
        self.dir.join(format!("{}_spectrum.json", key))
    }

    /// Write a model file atomically (temp file + rename)
    pub async fn store(&self, key: ModelKey, model: SpectrumModel) -> Result<PathBuf, FetchError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}_spectrum.json.tmp", key));
        let body = serde_json::to_vec(&SpectrumFile::new(key, model))
            .map_err(|e| FetchError::InvalidPayload(e.to_string()))?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    async fn read(&self, key: ModelKey) -> Result<FileState, FetchError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileState::NotBuilt),
            Err(e) => return Err(e.into()),
        };

        let file: SpectrumFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => return Ok(FileState::Invalid(format!("read error: {}", e))),
        };
        if !file.has_known_type() {
            return Ok(FileState::Invalid(format!("unknown type {:?}", file.kind)));
        }
        if !file.model.is_usable() {
            return Ok(FileState::Invalid("model has no band data".to_string()));
        }
        Ok(FileState::Ready(file.model))
    }
}

impl ModelProvider for DirectoryModelProvider {
    async fn fetch_models(&self, keys: Vec<ModelKey>) -> Result<ModelBatch, FetchError> {
        let mut batch = ModelBatch::default();
        for key in keys {
            match self.read(key).await? {
                FileState::Ready(model) => batch.models.push((key, Arc::new(model))),
                FileState::NotBuilt => {}
                FileState::Invalid(reason) => {
                    log::warn!("Spectrum file for {} is unusable: {}", key, reason);
                    batch.missing.push(key);
                }
            }
        }
        log::debug!(
            "DirectoryModelProvider: {} ready, {} missing",
            batch.models.len(),
            batch.missing.len()
        );
        Ok(batch)
    }
}
