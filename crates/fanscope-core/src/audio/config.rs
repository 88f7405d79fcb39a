//! Output device configuration

use serde::{Deserialize, Serialize};

/// Largest callback block the render scratch buffer covers (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Preferred output sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Output device selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Device name; `None` uses the system default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Requested sample rate; falls back to the device maximum
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Requested buffer size in frames
    pub buffer_size: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl OutputConfig {
    /// Buffer size clamped to what the render scratch buffer covers
    pub fn buffer_frames(&self) -> u32 {
        self.buffer_size.clamp(64, MAX_BUFFER_SIZE as u32)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Latency of one buffer in milliseconds
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        self.buffer_frames() as f32 / sample_rate.max(1) as f32 * 1000.0
    }
}
