//! Energy-conserving band aggregation
//!
//! Converts a fine spectrum (e.g. 1/48 octave) into a coarser one (1/12,
//! 1/3) by distributing each fine band's linear energy over the coarse bands
//! it overlaps, in proportion to the overlapping bandwidth:
//!
//! ```text
//! E_i      = p0² · 10^(L_i / 10)
//! overlap  = max(0, min(f2_i, f2_j) - max(f1_i, f1_j))
//! E_j     += E_i · overlap / (f2_i - f1_i)
//! L_j      = 10 · log10(E_j / p0²)
//! ```
//!
//! Coarse bands that receive no energy are omitted rather than zero-filled.

use super::grid::{band_edges, make_centers};
use crate::types::{REFERENCE_PRESSURE, SPECTRUM_F_MAX, SPECTRUM_F_MIN};

/// A banded spectrum: centre frequencies (Hz) and levels (dB)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandSpectrum {
    pub centers: Vec<f64>,
    pub levels_db: Vec<f64>,
}

impl BandSpectrum {
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    /// `[frequency, level]` pairs, the shape charts consume
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.centers
            .iter()
            .zip(self.levels_db.iter())
            .map(|(f, l)| [*f, *l])
            .collect()
    }

    /// Highest finite level, if any
    pub fn peak_db(&self) -> Option<f64> {
        self.levels_db
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .max_by(f64::total_cmp)
    }
}

/// Linear energy of a band level; non-finite levels carry no energy
///
/// Zero and negative dB are ordinary quiet levels and keep their energy.
#[inline]
pub fn level_to_energy(level_db: f64) -> f64 {
    if level_db.is_finite() {
        REFERENCE_PRESSURE * REFERENCE_PRESSURE * 10f64.powf(level_db / 10.0)
    } else {
        0.0
    }
}

/// Level in dB of a linear energy
#[inline]
pub fn energy_to_level(energy: f64) -> f64 {
    10.0 * (energy / (REFERENCE_PRESSURE * REFERENCE_PRESSURE)).log10()
}

/// Aggregate a fine spectrum into coarse bands over the audible range
///
/// `fine_resolution` and `coarse_resolution` are in bands per octave.
pub fn downsample(
    fine_centers: &[f64],
    fine_levels_db: &[f64],
    fine_resolution: f64,
    coarse_resolution: f64,
) -> BandSpectrum {
    downsample_in_range(
        fine_centers,
        fine_levels_db,
        fine_resolution,
        coarse_resolution,
        SPECTRUM_F_MIN,
        SPECTRUM_F_MAX,
    )
}

/// [`downsample`] with an explicit working frequency range
pub fn downsample_in_range(
    fine_centers: &[f64],
    fine_levels_db: &[f64],
    fine_resolution: f64,
    coarse_resolution: f64,
    f_min: f64,
    f_max: f64,
) -> BandSpectrum {
    let count = fine_centers.len().min(fine_levels_db.len());
    if count == 0 || !valid_resolution(fine_resolution) || !valid_resolution(coarse_resolution) {
        return BandSpectrum::default();
    }

    let coarse_centers = make_centers(coarse_resolution, f_min, f_max);
    if coarse_centers.is_empty() {
        return BandSpectrum::default();
    }
    let coarse_edges = band_edges(&coarse_centers, coarse_resolution);

    let fine_edges = band_edges(&fine_centers[..count], fine_resolution);
    let fine: Vec<FineBand> = fine_edges
        .into_iter()
        .zip(fine_levels_db[..count].iter())
        .map(|((lo, hi), level)| FineBand {
            lo,
            hi,
            energy: level_to_energy(*level),
        })
        .filter(|band| band.energy > 0.0 && band.hi > band.lo)
        .collect();

    let mut out = BandSpectrum::default();
    for (center, (lo_c, hi_c)) in coarse_centers.iter().zip(coarse_edges.iter()) {
        let energy: f64 = fine
            .iter()
            .map(|band| band.energy * band.overlap_fraction(*lo_c, *hi_c))
            .sum();

        if energy > 0.0 {
            out.centers.push(*center);
            out.levels_db.push(energy_to_level(energy));
        }
    }
    out
}

fn valid_resolution(n_per_oct: f64) -> bool {
    n_per_oct.is_finite() && n_per_oct > 0.0
}

#[derive(Debug, Clone, Copy)]
struct FineBand {
    lo: f64,
    hi: f64,
    energy: f64,
}

impl FineBand {
    /// Share of this band's width that falls inside `[lo, hi]`
    fn overlap_fraction(&self, lo: f64, hi: f64) -> f64 {
        let overlap = self.hi.min(hi) - self.lo.max(lo);
        if overlap <= 0.0 {
            0.0
        } else {
            overlap / (self.hi - self.lo)
        }
    }
}
