//! IEC 61260 fractional-octave band grids
//!
//! Band centres use the decimal (base-10) grid: `bands_per_decade =
//! round(n_per_oct · 10/3)` and exact centres `10^(k/bpd)`. Where a Renard
//! preferred-number table exists for the band density, exact centres are
//! snapped to the nearest nominal mantissa.

/// Renard mantissas for 3 bands per decade
const RENARD_3: [f64; 3] = [1.00, 2.00, 5.00];

/// R10 mantissas (1/3 octave)
const RENARD_10: [f64; 10] = [1.00, 1.25, 1.60, 2.00, 2.50, 3.15, 4.00, 5.00, 6.30, 8.00];

/// R20 mantissas (1/6 octave)
const RENARD_20: [f64; 20] = [
    1.00, 1.12, 1.25, 1.40, 1.60, 1.80, 2.00, 2.24, 2.50, 2.80, 3.15, 3.55, 4.00, 4.50, 5.00,
    5.60, 6.30, 7.10, 8.00, 9.00,
];

/// R40 mantissas (1/12 octave)
const RENARD_40: [f64; 40] = [
    1.00, 1.06, 1.12, 1.18, 1.25, 1.32, 1.40, 1.50, 1.60, 1.70, 1.80, 1.90, 2.00, 2.12, 2.24,
    2.36, 2.50, 2.65, 2.80, 3.00, 3.15, 3.35, 3.55, 3.75, 4.00, 4.25, 4.50, 4.75, 5.00, 5.30,
    5.60, 6.00, 6.30, 6.70, 7.10, 7.50, 8.00, 8.50, 9.00, 9.50,
];

/// Snapped centres are deduplicated at this precision (Hz)
const DEDUP_SCALE: f64 = 1e6;

/// Band density on the decimal grid for a given bands-per-octave resolution
pub fn bands_per_decade(n_per_oct: f64) -> i64 {
    (n_per_oct * 10.0 / 3.0).round() as i64
}

/// Preferred-number mantissas for a band density, if standardised
pub fn renard_mantissas(bpd: i64) -> Option<&'static [f64]> {
    match bpd {
        3 => Some(&RENARD_3),
        10 => Some(&RENARD_10),
        20 => Some(&RENARD_20),
        40 => Some(&RENARD_40),
        _ => None,
    }
}

/// Snap exact centres to the nearest preferred number
///
/// Non-finite and non-positive values are dropped. The result is sorted and
/// deduplicated. Densities without a table return the input values sorted.
pub fn snap_to_renard(values: &[f64], bpd: i64) -> Vec<f64> {
    let mut out: Vec<f64> = values
        .iter()
        .copied()
        .filter(|f| f.is_finite() && *f > 0.0)
        .map(|f| match renard_mantissas(bpd) {
            Some(mantissas) => snap_one(f, mantissas),
            None => f,
        })
        .map(|f| (f * DEDUP_SCALE).round() / DEDUP_SCALE)
        .collect();

    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

fn snap_one(f: f64, mantissas: &[f64]) -> f64 {
    let exponent = f.log10().floor();
    let scale = 10f64.powf(exponent);
    let mantissa = f / scale;

    // 10.0 stands in for the next decade's 1.00 so that values a hair below
    // a power of ten (9.99999…) don't snap down to the last table entry.
    let best = mantissas
        .iter()
        .copied()
        .chain(std::iter::once(10.0))
        .min_by(|a, b| (a - mantissa).abs().total_cmp(&(b - mantissa).abs()))
        .unwrap_or(mantissa);

    best * scale
}

/// Nominal band centres for a resolution within `[f_min, f_max]`
pub fn make_centers(n_per_oct: f64, f_min: f64, f_max: f64) -> Vec<f64> {
    let bpd = bands_per_decade(n_per_oct);
    if bpd <= 0 {
        return Vec::new();
    }
    let bpd_f = bpd as f64;
    let k_min = (bpd_f * f_min.max(1e-12).log10()).ceil() as i64;
    let k_max = (bpd_f * f_max.max(1e-12).log10()).floor() as i64;
    if k_max < k_min {
        return Vec::new();
    }

    let exact: Vec<f64> = (k_min..=k_max)
        .map(|k| 10f64.powf(k as f64 / bpd_f))
        .collect();

    snap_to_renard(&exact, bpd)
        .into_iter()
        .filter(|f| *f >= f_min && *f <= f_max)
        .collect()
}

/// Geometric half-band ratio `g = 10^(1/(2·bpd))`
pub fn half_band_ratio(n_per_oct: f64) -> f64 {
    let bpd = bands_per_decade(n_per_oct).max(1) as f64;
    10f64.powf(1.0 / (2.0 * bpd))
}

/// Lower/upper band edges `(c/g, c·g)` for each centre
pub fn band_edges(centers: &[f64], n_per_oct: f64) -> Vec<(f64, f64)> {
    let g = half_band_ratio(n_per_oct);
    centers.iter().map(|c| (c / g, c * g)).collect()
}
