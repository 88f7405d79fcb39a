//! Gapless clip playback
//!
//! - ClipProvider: external source of encoded clips per operating point
//! - AudioClip / ClipCache: decoded clips, fetched once per whole RPM
//! - LoopScheduler: places crossfaded copies on the output clock
//! - OutputStage: seam to the render side ([`MixerOutput`](crate::engine::MixerOutput))
//!
//! The session state machine that ties these together runs in
//! [`PlaybackService`](crate::services::PlaybackService).

mod clip;
mod error;
pub(crate) mod output;
mod scheduler;

use std::future::Future;

pub use clip::{decode_wav, AudioClip, ClipCache, ClipHandle};
pub use error::{
    ClipError, ClipErrorCode, ClipFetchError, PlaybackError, PlaybackErrorKind, PlaybackResult,
};
pub use output::OutputStage;
pub use scheduler::LoopScheduler;

#[cfg(test)]
pub(crate) use clip::encode_wav;

use crate::models::{FanCurve, SpectrumModel};
use crate::types::ModelKey;

/// Source of encoded (WAV) clips
pub trait ClipProvider: Send + Sync + 'static {
    /// Fetch the clip of `model` at operating point `point` (RPM)
    fn fetch_clip(
        &self,
        model: ModelKey,
        point: f64,
    ) -> impl Future<Output = Result<Vec<u8>, ClipFetchError>> + Send;
}

/// A play request from the UI
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    /// Curve identity; playing the same identity again toggles it off
    pub identity: String,
    pub model: ModelKey,
    /// Operating point in RPM
    pub point: f64,
    /// Whether recorded audio exists for the curve
    pub supports_audio: bool,
}

impl PlayRequest {
    pub fn new(identity: impl Into<String>, model: ModelKey, point: f64) -> Self {
        Self {
            identity: identity.into(),
            model,
            point,
            supports_audio: true,
        }
    }

    /// Request for `curve`; audio is available when either the curve or its
    /// resolved spectrum model says so
    pub fn for_curve(curve: &FanCurve, model: Option<&SpectrumModel>, point: f64) -> Self {
        Self {
            supports_audio: curve.supports_audio || model.is_some_and(|m| m.supports_audio),
            ..Self::new(curve.identity.clone(), curve.model, point)
        }
    }
}

/// Outcome of a play request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Stopped,
}
