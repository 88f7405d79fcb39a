//! Decoded playback clips
//!
//! The clip provider returns an encoded WAV of one operating point. It is
//! decoded once into interleaved stereo `f32` frames and shared with the
//! render side as a `basedrop::Shared<AudioClip>`.

use std::collections::HashMap;
use std::io::Cursor;

use basedrop::Shared;

use super::error::ClipError;
use crate::engine::gc_handle;
use crate::types::{ClipKey, Sample, StereoSample};

/// Clip shared with the render thread
pub type ClipHandle = Shared<AudioClip>;

/// Shortest clip that can loop without exhausting the mixer's voices
pub const MIN_CLIP_SECONDS: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    frames: Vec<StereoSample>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(frames: Vec<StereoSample>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn frames(&self) -> &[StereoSample] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Linearly interpolated frame at `t` seconds; silence outside the clip
    ///
    /// Resamples on the fly when the clip rate differs from the output rate.
    #[inline]
    pub fn sample_at(&self, t: f64) -> StereoSample {
        if !(t >= 0.0) {
            return StereoSample::silence();
        }
        let pos = t * self.sample_rate as f64;
        let index = pos as usize;
        let Some(current) = self.frames.get(index) else {
            return StereoSample::silence();
        };
        let next = self.frames.get(index + 1).copied().unwrap_or(*current);
        current.lerp(&next, (pos - index as f64) as Sample)
    }
}

/// Decode an encoded WAV clip
///
/// Integer samples are normalised by their bit depth; mono is duplicated to
/// both channels and only the first two channels of wider files are kept.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip, ClipError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(ClipError::UnsupportedFormat("zero channels".to_string()));
    }

    let samples: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(ClipError::UnsupportedFormat(format!(
                    "{}-bit integer samples",
                    spec.bits_per_sample
                )));
            }
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let frames: Vec<StereoSample> = samples
        .chunks_exact(channels)
        .map(|frame| match frame {
            [mono] => StereoSample::mono(*mono),
            [left, right, ..] => StereoSample::new(*left, *right),
            [] => StereoSample::silence(),
        })
        .collect();

    if frames.is_empty() {
        return Err(ClipError::Empty);
    }
    let clip = AudioClip::new(frames, spec.sample_rate);
    if clip.duration() < MIN_CLIP_SECONDS {
        return Err(ClipError::TooShort(clip.duration()));
    }
    Ok(clip)
}

/// Decoded clips per model and whole operating point
///
/// Lazily filled and never evicted: a session touches a handful of points.
#[derive(Default)]
pub struct ClipCache {
    clips: HashMap<ClipKey, ClipHandle>,
}

impl ClipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ClipKey) -> Option<ClipHandle> {
        self.clips.get(key).map(Shared::clone)
    }

    /// Store a decoded clip, returning the shared handle
    pub fn insert(&mut self, key: ClipKey, clip: AudioClip) -> ClipHandle {
        let handle = Shared::new(&gc_handle(), clip);
        self.clips.insert(key, Shared::clone(&handle));
        handle
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Encode frames as a 16-bit WAV (test fixtures)
#[cfg(test)]
pub(crate) fn encode_wav(frames: &[StereoSample], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for frame in frames {
            writer.write_sample((frame.left * 32767.0) as i16).unwrap();
            if channels > 1 {
                writer.write_sample((frame.right * 32767.0) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
