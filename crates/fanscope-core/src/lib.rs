//! Fanscope Core - fan curve interpolation, octave-band spectra and gapless
//! clip playback

pub mod audio;
pub mod cache;
pub mod config;
pub mod controller;
pub mod curve;
pub mod engine;
pub mod models;
pub mod octave;
pub mod playback;
pub mod services;
pub mod spectrum;
pub mod types;

pub use controller::{FanscopeController, SpectrumView};
pub use types::*;
