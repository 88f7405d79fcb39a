//! Fractional-octave band grids and energy-conserving aggregation

mod aggregate;
mod grid;

pub use aggregate::{
    downsample, downsample_in_range, energy_to_level, level_to_energy, BandSpectrum,
};
pub use grid::{band_edges, bands_per_decade, half_band_ratio, make_centers, snap_to_renard};

use serde::{Deserialize, Serialize};

/// Display resolution of a spectrum view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OctaveResolution {
    #[serde(rename = "1_3")]
    Third,
    #[serde(rename = "1_12")]
    Twelfth,
    /// Native provider resolution
    #[default]
    #[serde(rename = "1_48")]
    FortyEighth,
}

impl OctaveResolution {
    pub const ALL: [OctaveResolution; 3] = [
        OctaveResolution::Third,
        OctaveResolution::Twelfth,
        OctaveResolution::FortyEighth,
    ];

    pub fn bands_per_octave(&self) -> f64 {
        match self {
            OctaveResolution::Third => 3.0,
            OctaveResolution::Twelfth => 12.0,
            OctaveResolution::FortyEighth => 48.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OctaveResolution::Third => "1_3",
            OctaveResolution::Twelfth => "1_12",
            OctaveResolution::FortyEighth => "1_48",
        }
    }

    /// Parse a mode name (`"1_3"`, `"1_12"`, `"1_48"`, also `"1/3"` etc.)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().replace('/', "_").as_str() {
            "1_3" | "3" => Some(OctaveResolution::Third),
            "1_12" | "12" => Some(OctaveResolution::Twelfth),
            "1_48" | "48" => Some(OctaveResolution::FortyEighth),
            _ => None,
        }
    }

    /// Whether displaying at this resolution requires aggregating a spectrum
    /// of `native` bands per octave
    pub fn is_coarser_than(&self, native: f64) -> bool {
        native.is_finite() && self.bands_per_octave() < native
    }
}

impl std::fmt::Display for OctaveResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_names() {
        for res in OctaveResolution::ALL {
            assert_eq!(OctaveResolution::from_name(res.name()), Some(res));
        }
        assert_eq!(OctaveResolution::from_name("1/12"), Some(OctaveResolution::Twelfth));
        assert_eq!(OctaveResolution::from_name("1_6"), None);
    }

    #[test]
    fn test_coarser_than_native() {
        assert!(OctaveResolution::Third.is_coarser_than(48.0));
        assert!(!OctaveResolution::FortyEighth.is_coarser_than(48.0));
        assert!(!OctaveResolution::Twelfth.is_coarser_than(f64::NAN));
    }

    #[test]
    fn test_resolution_serde() {
        let res: OctaveResolution = serde_yaml::from_str("\"1_12\"").unwrap();
        assert_eq!(res, OctaveResolution::Twelfth);
    }
}
