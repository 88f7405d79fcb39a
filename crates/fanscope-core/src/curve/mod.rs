//! Piecewise cubic Hermite (PCHIP) evaluation
//!
//! Every curve in Fanscope (airflow vs. RPM, RPM vs. noise, per-band sound
//! level vs. RPM) arrives as a pre-fitted [`PiecewiseModel`]. Evaluation is
//! pure; [`PointCache`] adds a bounded LRU of evaluated points for hot paths
//! such as re-rendering a spectrum while the pointer is dragged.

mod cache;
mod pchip;

pub use cache::{PointCache, DEFAULT_POINT_CACHE_CAPACITY};
pub use pchip::PiecewiseModel;
