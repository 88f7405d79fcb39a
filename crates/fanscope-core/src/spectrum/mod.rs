//! Spectrum assembly for the visible curves
//!
//! Turns resolved spectrum models into chart-ready series at the current
//! operating point, and keeps the level axis stable while the point moves.

mod assembler;
mod axis;
mod operating_point;

pub use assembler::{CurveSeries, SpectrumAssembler};
pub use axis::{axis_max_for_peak, AxisSignature, LevelAxis};
pub use operating_point::{rpm_max_for, rpm_min_for, target_rpm};
