//! Visible fan curves and their cross models

use serde::{Deserialize, Serialize};

use crate::curve::PiecewiseModel;
use crate::types::ModelKey;

/// Raw measured samples of a curve
///
/// Arrays may contain `null` where a measurement is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveSamples {
    #[serde(default)]
    pub rpm: Vec<Option<f64>>,
    #[serde(default)]
    pub noise_db: Vec<Option<f64>>,
    #[serde(default)]
    pub airflow: Vec<Option<f64>>,
}

impl CurveSamples {
    /// Largest finite positive RPM sample
    pub fn max_rpm(&self) -> Option<f64> {
        self.rpm
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
            .max_by(f64::total_cmp)
    }

    /// Smallest finite positive RPM sample
    pub fn min_rpm(&self) -> Option<f64> {
        self.rpm
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
            .min_by(f64::total_cmp)
    }
}

/// Pre-fitted cross models between the curve axes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossModels {
    #[serde(default)]
    pub rpm_to_airflow: Option<PiecewiseModel>,
    #[serde(default)]
    pub rpm_to_noise_db: Option<PiecewiseModel>,
    #[serde(default)]
    pub noise_to_rpm: Option<PiecewiseModel>,
    #[serde(default)]
    pub noise_to_airflow: Option<PiecewiseModel>,
}

/// One visible curve: a fan under a test condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanCurve {
    /// Stable UI identity (also the playback identity)
    #[serde(rename = "key")]
    pub identity: String,
    #[serde(flatten)]
    pub model: ModelKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: CurveSamples,
    #[serde(default)]
    pub pchip: CrossModels,
    #[serde(default)]
    pub supports_audio: bool,
}

impl FanCurve {
    pub fn new(identity: impl Into<String>, model: ModelKey) -> Self {
        Self {
            identity: identity.into(),
            model,
            name: String::new(),
            data: CurveSamples::default(),
            pchip: CrossModels::default(),
            supports_audio: false,
        }
    }

    pub fn with_rpm_samples(mut self, rpm: impl IntoIterator<Item = f64>) -> Self {
        self.data.rpm = rpm.into_iter().map(Some).collect();
        self
    }

    pub fn with_cross_models(mut self, pchip: CrossModels) -> Self {
        self.pchip = pchip;
        self
    }
}
