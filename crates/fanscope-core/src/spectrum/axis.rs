//! Level-axis maximum with hysteresis
//!
//! The level axis must not jump while the user drags the operating point,
//! so its maximum depends only on which curves are shown (each evaluated at
//! its own top speed) and is recomputed when that set changes.

use crate::octave::OctaveResolution;

/// Headroom above the loudest band
const HEADROOM: f64 = 1.1;

/// Peak assumed when no curve yields a level
const DEFAULT_PEAK_DB: f64 = 60.0;

/// Smallest axis maximum
const MIN_AXIS_DB: f64 = 10.0;

/// Axis maximum for a given peak level
pub fn axis_max_for_peak(peak_db: Option<f64>) -> f64 {
    let peak = peak_db.filter(|p| p.is_finite()).unwrap_or(DEFAULT_PEAK_DB);
    (HEADROOM * peak).ceil().max(MIN_AXIS_DB)
}

/// What the axis maximum depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSignature {
    /// Sorted visible curve identities
    pub identities: Vec<String>,
    /// How many of them have a resolved model
    pub resolved: usize,
    pub resolution: OctaveResolution,
}

impl AxisSignature {
    pub fn new(
        identities: impl IntoIterator<Item = String>,
        resolved: usize,
        resolution: OctaveResolution,
    ) -> Self {
        let mut identities: Vec<String> = identities.into_iter().collect();
        identities.sort();
        Self {
            identities,
            resolved,
            resolution,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LevelAxis {
    signature: Option<AxisSignature>,
    max_db: f64,
}

impl Default for LevelAxis {
    fn default() -> Self {
        Self {
            signature: None,
            max_db: axis_max_for_peak(None),
        }
    }
}

impl LevelAxis {
    pub fn max_db(&self) -> f64 {
        self.max_db
    }

    /// Recompute the maximum if `signature` changed or `force` is set
    ///
    /// `peak` is only called when a recomputation happens.
    pub fn update(
        &mut self,
        signature: AxisSignature,
        force: bool,
        peak: impl FnOnce() -> Option<f64>,
    ) -> f64 {
        if force || self.signature.as_ref() != Some(&signature) {
            self.max_db = axis_max_for_peak(peak());
            log::debug!(
                "Level axis max {} dB ({} curves, {} resolved, {})",
                self.max_db,
                signature.identities.len(),
                signature.resolved,
                signature.resolution
            );
            self.signature = Some(signature);
        }
        self.max_db
    }

    pub fn invalidate(&mut self) {
        self.signature = None;
    }
}
