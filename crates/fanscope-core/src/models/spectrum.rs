//! Spectrum models as served by the model provider
//!
//! A spectrum model is a set of per-band [`PiecewiseModel`]s, one per
//! frequency centre, each giving the band level (dB) as a function of RPM.

use serde::{Deserialize, Serialize};

use crate::curve::PiecewiseModel;
use crate::types::DEFAULT_NATIVE_RESOLUTION;

/// Calibration block of a spectrum model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Native resolution in bands per octave
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_per_oct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_max: Option<f64>,
}

/// Per-band level models for one (entity, condition)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumModel {
    /// Band centre frequencies (Hz)
    #[serde(rename = "centers_hz", alias = "freq_hz", alias = "freq", default)]
    pub centers: Vec<f64>,

    /// One level model per centre; `null` entries are bands without data
    #[serde(rename = "band_models_pchip", default)]
    pub band_models: Vec<Option<PiecewiseModel>>,

    #[serde(default)]
    pub calibration: Calibration,

    // Older payloads carry these at the top level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_per_oct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_max: Option<f64>,

    #[serde(default)]
    pub supports_audio: bool,
}

impl SpectrumModel {
    /// Native resolution in bands per octave (calibration first, then top
    /// level, else 48)
    pub fn native_resolution(&self) -> f64 {
        self.calibration
            .n_per_oct
            .or(self.n_per_oct)
            .filter(|n| n.is_finite() && *n > 0.0)
            .unwrap_or(DEFAULT_NATIVE_RESOLUTION)
    }

    /// Lowest calibrated RPM (calibration first, then top level), when positive
    pub fn min_operating_point(&self) -> Option<f64> {
        positive(self.calibration.rpm_min).or(positive(self.rpm_min))
    }

    /// Highest calibrated RPM, when known and positive
    pub fn max_operating_point(&self) -> Option<f64> {
        positive(self.calibration.rpm_max).or(positive(self.rpm_max))
    }

    /// A model counts as resolved only if both band arrays are present
    pub fn is_usable(&self) -> bool {
        !self.centers.is_empty() && !self.band_models.is_empty()
    }

    /// Fine `(centre, level)` pairs, one band evaluation per present band
    ///
    /// `eval` receives the band index and its model. Null bands and bands
    /// with a non-finite centre or level are skipped; non-positive levels are
    /// kept.
    pub fn levels_with(&self, mut eval: impl FnMut(usize, &PiecewiseModel) -> f64) -> Vec<(f64, f64)> {
        self.centers
            .iter()
            .zip(self.band_models.iter())
            .enumerate()
            .filter(|(_, (f, _))| f.is_finite())
            .filter_map(|(i, (f, band))| {
                let level = eval(i, band.as_ref()?);
                level.is_finite().then_some((*f, level))
            })
            .collect()
    }
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "centers_hz": [100.0, 200.0, 400.0],
        "band_models_pchip": [
            {"x": [1000, 2000], "y": [30, 40], "m": [0.01, 0.01], "x0": 1000, "x1": 2000},
            null,
            {"x": [1000, 2000], "y": [20, 35], "m": [0.015, 0.015]}
        ],
        "calibration": {"n_per_oct": 12, "rpm_max": 2000},
        "rpm_min": 800,
        "supports_audio": true
    }"#;

    #[test]
    fn test_parse_provider_payload() {
        let model: SpectrumModel = serde_json::from_str(PAYLOAD).unwrap();
        assert!(model.is_usable());
        assert!(model.supports_audio);
        assert_eq!(model.native_resolution(), 12.0);
        assert_eq!(model.min_operating_point(), Some(800.0));
        assert_eq!(model.max_operating_point(), Some(2000.0));
    }

    #[test]
    fn test_levels_skip_null_bands() {
        let model: SpectrumModel = serde_json::from_str(PAYLOAD).unwrap();
        let mut visited = Vec::new();
        let levels = model.levels_with(|i, band| {
            visited.push(i);
            band.evaluate(1000.0)
        });
        assert_eq!(levels, vec![(100.0, 30.0), (400.0, 20.0)]);
        assert_eq!(visited, vec![0, 2]);
    }

    #[test]
    fn test_levels_skip_non_finite_but_keep_negative() {
        let mut model: SpectrumModel = serde_json::from_str(PAYLOAD).unwrap();
        model.centers[0] = f64::NAN;
        let levels = model.levels_with(|i, _| if i == 2 { -3.0 } else { f64::INFINITY });
        assert_eq!(levels, vec![(400.0, -3.0)]);
    }

    #[test]
    fn test_defaults() {
        let model: SpectrumModel = serde_json::from_str(r#"{"freq_hz": [100.0]}"#).unwrap();
        assert_eq!(model.centers, vec![100.0]);
        assert!(!model.is_usable());
        assert_eq!(model.native_resolution(), DEFAULT_NATIVE_RESOLUTION);
        assert_eq!(model.max_operating_point(), None);
    }

    #[test]
    fn test_top_level_resolution_and_non_positive_bounds() {
        let model: SpectrumModel =
            serde_json::from_str(r#"{"n_per_oct": 24, "rpm_max": 0, "rpm_min": -5}"#).unwrap();
        assert_eq!(model.native_resolution(), 24.0);
        assert_eq!(model.max_operating_point(), None);
        assert_eq!(model.min_operating_point(), None);
    }
}
