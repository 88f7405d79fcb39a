//! Spectrum model cache
//!
//! The bookkeeping ([`ModelStore`]) and the provider seam live here; the
//! single-flight coalescing actor that drives them is
//! [`ModelCacheService`](crate::services::ModelCacheService).

mod error;
mod provider;
mod store;

pub use error::{CacheError, CacheResult, FetchError};
pub use provider::{DirectoryModelProvider, ModelProvider, SpectrumFile};
pub use store::{ApplyOutcome, ModelStore};
