//! Common types for Fanscope
//!
//! Identifiers shared by the model cache, the spectrum assembly and the
//! playback scheduler, plus the small stereo sample type used by the
//! render engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lower edge of the displayed / aggregated frequency range (Hz)
pub const SPECTRUM_F_MIN: f64 = 20.0;

/// Upper edge of the displayed / aggregated frequency range (Hz)
pub const SPECTRUM_F_MAX: f64 = 20_000.0;

/// Reference sound pressure for dB SPL conversion (20 µPa)
pub const REFERENCE_PRESSURE: f64 = 20e-6;

/// Default native resolution of provider spectra (bands per octave)
pub const DEFAULT_NATIVE_RESOLUTION: f64 = 48.0;

/// Audio sample type used by the render engine
pub type Sample = f32;

/// Identifies one spectrum model: a fan (entity) measured under a condition
///
/// Rendered as `"entityId_conditionId"`, which is also the cache key format
/// used by the model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    #[serde(rename = "model_id")]
    pub entity_id: i64,
    pub condition_id: i64,
}

impl ModelKey {
    pub fn new(entity_id: i64, condition_id: i64) -> Self {
        Self {
            entity_id,
            condition_id,
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.entity_id, self.condition_id)
    }
}

/// Error parsing a `"entityId_conditionId"` key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid model key: {0:?}")]
pub struct ParseKeyError(pub String);

impl FromStr for ModelKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity, condition) = s
            .split_once('_')
            .ok_or_else(|| ParseKeyError(s.to_string()))?;
        let entity_id = entity
            .trim()
            .parse()
            .map_err(|_| ParseKeyError(s.to_string()))?;
        let condition_id = condition
            .trim()
            .parse()
            .map_err(|_| ParseKeyError(s.to_string()))?;
        Ok(Self::new(entity_id, condition_id))
    }
}

/// Key for a decoded playback clip
///
/// Clips are cached per whole-RPM operating point, so two requests that
/// round to the same RPM share one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipKey {
    pub model: ModelKey,
    pub rounded_point: i64,
}

impl ClipKey {
    pub fn new(model: ModelKey, operating_point: f64) -> Self {
        Self {
            model,
            rounded_point: operating_point.round() as i64,
        }
    }
}

impl fmt::Display for ClipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.model, self.rounded_point)
    }
}

/// Controlling axis of the main chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Axis {
    /// Fan speed in RPM (native unit of spectrum band models)
    #[default]
    #[serde(rename = "rpm")]
    Rpm,
    /// A-weighted noise level in dB
    #[serde(rename = "noise_db")]
    NoiseDb,
}

impl Axis {
    pub fn name(&self) -> &'static str {
        match self {
            Axis::Rpm => "rpm",
            Axis::NoiseDb => "noise_db",
        }
    }
}

/// A target position on the controlling axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    pub axis: Axis,
    pub value: f64,
}

impl OperatingPoint {
    pub fn rpm(value: f64) -> Self {
        Self {
            axis: Axis::Rpm,
            value,
        }
    }

    pub fn noise_db(value: f64) -> Self {
        Self {
            axis: Axis::NoiseDb,
            value,
        }
    }
}

/// A single stereo sample (left and right channels)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Linear interpolation towards `other`
    #[inline]
    pub fn lerp(&self, other: &Self, t: Sample) -> Self {
        Self {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_key_display_roundtrip() {
        let key = ModelKey::new(12, 3);
        assert_eq!(key.to_string(), "12_3");
        assert_eq!("12_3".parse::<ModelKey>().unwrap(), key);
    }

    #[test]
    fn test_model_key_rejects_garbage() {
        assert!("12".parse::<ModelKey>().is_err());
        assert!("a_3".parse::<ModelKey>().is_err());
        assert!("12_".parse::<ModelKey>().is_err());
    }

    #[test]
    fn test_model_key_wire_names() {
        let key: ModelKey = serde_json::from_str(r#"{"model_id": 7, "condition_id": 2}"#).unwrap();
        assert_eq!(key, ModelKey::new(7, 2));
    }

    #[test]
    fn test_clip_key_rounds_operating_point() {
        let key = ModelKey::new(1, 1);
        assert_eq!(ClipKey::new(key, 1199.6), ClipKey::new(key, 1200.4));
        assert_ne!(ClipKey::new(key, 1199.4), ClipKey::new(key, 1200.0));
        assert_eq!(ClipKey::new(key, 1200.2).to_string(), "1_1_1200");
    }

    #[test]
    fn test_stereo_lerp() {
        let a = StereoSample::new(0.0, 1.0);
        let b = StereoSample::new(1.0, 0.0);
        assert_eq!(a.lerp(&b, 0.5), StereoSample::mono(0.5));
    }
}
