//! Audio output
//!
//! The render side is a [`LoopMixer`](crate::engine::LoopMixer). With the
//! `cpal-backend` feature it is driven by a real output device; without it
//! the mixer can still be rendered offline.

mod config;
mod error;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;

pub use config::{OutputConfig, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
pub use error::{AudioError, AudioResult};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{start_output, CpalAudioHandle};
