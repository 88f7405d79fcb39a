//! Data models exchanged with the model provider and the UI

mod curve;
mod payload;
mod spectrum;

pub use curve::{CrossModels, CurveSamples, FanCurve};
pub use payload::ModelBatch;
pub use spectrum::{Calibration, SpectrumModel};
