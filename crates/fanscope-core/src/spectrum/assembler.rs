//! Per-curve spectrum series
//!
//! For every visible curve with a resolved model the assembler evaluates each
//! band model at the curve's target RPM and, when the display resolution is
//! coarser than the model's native one, aggregates the fine bands.
//! Band evaluations go through one [`PointCache`] per band, rebuilt whenever
//! the cache hands out a different model for the key.

use std::collections::HashMap;
use std::sync::Arc;

use super::axis::{AxisSignature, LevelAxis};
use super::operating_point::{rpm_max_for, target_rpm};
use crate::config::SpectrumConfig;
use crate::curve::PointCache;
use crate::models::{FanCurve, SpectrumModel};
use crate::octave::{downsample_in_range, BandSpectrum, OctaveResolution};
use crate::types::{ModelKey, OperatingPoint};

/// Displayable spectrum of one curve
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSeries {
    pub identity: String,
    pub model: ModelKey,
    /// Speed the spectrum was evaluated at; `None` without a model
    pub rpm: Option<f64>,
    /// `[frequency Hz, level dB]`
    pub points: Vec<[f64; 2]>,
}

impl CurveSeries {
    fn empty(curve: &FanCurve) -> Self {
        Self {
            identity: curve.identity.clone(),
            model: curve.model,
            rpm: None,
            points: Vec::new(),
        }
    }
}

/// Band point caches for one resolved model
struct BandCaches {
    model: Arc<SpectrumModel>,
    bands: Vec<PointCache>,
}

impl BandCaches {
    fn new(model: Arc<SpectrumModel>, capacity: usize) -> Self {
        let bands = (0..model.band_models.len())
            .map(|_| PointCache::new(capacity))
            .collect();
        Self { model, bands }
    }

    /// Fine `(centre, level)` pairs at `rpm`, each band through its cache
    fn levels_at(&mut self, rpm: f64) -> Vec<(f64, f64)> {
        let bands = &mut self.bands;
        self.model.levels_with(|i, band| bands[i].evaluate(band, rpm))
    }
}

pub struct SpectrumAssembler {
    config: SpectrumConfig,
    eval_capacity: usize,
    caches: HashMap<ModelKey, BandCaches>,
    axis: LevelAxis,
}

impl SpectrumAssembler {
    pub fn new(config: SpectrumConfig, eval_capacity: usize) -> Self {
        Self {
            config,
            eval_capacity,
            caches: HashMap::new(),
            axis: LevelAxis::default(),
        }
    }

    /// One series per curve, in input order
    ///
    /// Curves without a resolved model, or whose target speed isn't
    /// positive, produce an empty series.
    pub fn build_series(
        &mut self,
        curves: &[FanCurve],
        target: OperatingPoint,
        resolution: OctaveResolution,
        models: &HashMap<ModelKey, Arc<SpectrumModel>>,
    ) -> Vec<CurveSeries> {
        let series = curves
            .iter()
            .map(|curve| {
                let Some(model) = models.get(&curve.model) else {
                    return CurveSeries::empty(curve);
                };
                let rpm = target_rpm(curve, Some(model.as_ref()), target);
                if !(rpm.is_finite() && rpm > 0.0) {
                    return CurveSeries::empty(curve);
                }
                let spectrum = self.spectrum_at(curve.model, model, rpm, resolution);
                CurveSeries {
                    identity: curve.identity.clone(),
                    model: curve.model,
                    rpm: Some(rpm),
                    points: spectrum.points(),
                }
            })
            .collect();

        self.caches.retain(|key, _| curves.iter().any(|c| c.model == *key));
        series
    }

    /// Level-axis maximum for the visible curves
    ///
    /// Recomputed only when the visible set, the number of resolved models or
    /// the resolution changed, or when `force` is set.
    pub fn level_axis_max(
        &mut self,
        curves: &[FanCurve],
        resolution: OctaveResolution,
        models: &HashMap<ModelKey, Arc<SpectrumModel>>,
        force: bool,
    ) -> f64 {
        let resolved = curves
            .iter()
            .filter(|c| models.contains_key(&c.model))
            .count();
        let signature = AxisSignature::new(
            curves.iter().map(|c| c.identity.clone()),
            resolved,
            resolution,
        );

        let mut axis = std::mem::take(&mut self.axis);
        let max = axis.update(signature, force, || self.peak_level(curves, resolution, models));
        self.axis = axis;
        max
    }

    /// Force the next axis computation
    pub fn invalidate_axis(&mut self) {
        self.axis.invalidate();
    }

    /// Loudest band over all curves, each at its own top speed
    fn peak_level(
        &mut self,
        curves: &[FanCurve],
        resolution: OctaveResolution,
        models: &HashMap<ModelKey, Arc<SpectrumModel>>,
    ) -> Option<f64> {
        let mut peak: Option<f64> = None;
        for curve in curves {
            let Some(model) = models.get(&curve.model) else {
                continue;
            };
            let rpm = rpm_max_for(curve, Some(model.as_ref()));
            if rpm <= 0.0 {
                continue;
            }
            let fine = self.fine_levels(curve.model, model, rpm);
            let aggregated = self.aggregate(&fine, model, resolution);
            let curve_peak = aggregated.peak_db().or_else(|| fine.peak_db());
            peak = match (peak, curve_peak) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        peak
    }

    fn spectrum_at(
        &mut self,
        key: ModelKey,
        model: &Arc<SpectrumModel>,
        rpm: f64,
        resolution: OctaveResolution,
    ) -> BandSpectrum {
        let fine = self.fine_levels(key, model, rpm);
        self.aggregate(&fine, model, resolution)
    }

    fn fine_levels(&mut self, key: ModelKey, model: &Arc<SpectrumModel>, rpm: f64) -> BandSpectrum {
        let capacity = self.eval_capacity;
        let caches = self
            .caches
            .entry(key)
            .or_insert_with(|| BandCaches::new(Arc::clone(model), capacity));
        if !Arc::ptr_eq(&caches.model, model) {
            *caches = BandCaches::new(Arc::clone(model), capacity);
        }
        let (centers, levels_db) = caches.levels_at(rpm).into_iter().unzip();
        BandSpectrum { centers, levels_db }
    }

    fn aggregate(
        &self,
        fine: &BandSpectrum,
        model: &SpectrumModel,
        resolution: OctaveResolution,
    ) -> BandSpectrum {
        let native = model.native_resolution();
        if !resolution.is_coarser_than(native) {
            return fine.clone();
        }
        downsample_in_range(
            &fine.centers,
            &fine.levels_db,
            native,
            resolution.bands_per_octave(),
            self.config.f_min,
            self.config.f_max,
        )
    }
}
