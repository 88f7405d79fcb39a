//! CPAL output backend
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │ PlaybackService  │───push()───────────►│   Command Queue     │
//! │  (MixerOutput)   │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ frames_rendered, ended ids                ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │   MixerAtomics   │◄────────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │                     │  (owns LoopMixer)   │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The callback owns the mixer and its scratch buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{OutputConfig, MAX_BUFFER_SIZE};
use super::error::{AudioError, AudioResult};
use crate::config::PlaybackConfig;
use crate::engine::{LoopMixer, MixerOutput};
use crate::types::StereoSample;

/// Keeps the output stream alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

/// Open the output device and start rendering a fresh [`LoopMixer`]
///
/// Returns the stream handle and the control side of the mixer, ready to
/// be handed to the playback service.
pub fn start_output(
    output: &OutputConfig,
    playback: &PlaybackConfig,
) -> AudioResult<(CpalAudioHandle, MixerOutput)> {
    let device = find_device(output.device.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = get_output_config(&device, output)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = output.buffer_frames();

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        output.latency_ms(sample_rate)
    );

    let (mixer, mixer_output) =
        LoopMixer::new(sample_rate, playback.master_gain, playback.limiter_threshold_db);

    let stream = build_output_stream(&device, &stream_config, mixer)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok((
        CpalAudioHandle {
            _stream: stream,
            sample_rate,
            buffer_size,
        },
        mixer_output,
    ))
}

fn find_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string())),
        Some(name) => host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
    }
}

/// Pick an f32 stereo config at the requested rate, falling back to the
/// device maximum
fn get_output_config(
    device: &cpal::Device,
    config: &OutputConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let target = config.target_sample_rate();
    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0
    };

    let best = supported_configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && in_range(c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| AudioError::ConfigError("No f32 output configuration".to_string()))?;

    let sample_rate = if in_range(best) {
        cpal::SampleRate(target)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(sample_rate))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: LoopMixer,
) -> AudioResult<Stream> {
    let channels = (config.channels as usize).max(1);
    // Pre-allocated; the callback never allocates
    let mut scratch = vec![StereoSample::silence(); MAX_BUFFER_SIZE];

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = chunk.len() / channels;
                    let block = &mut scratch[..n_frames];
                    mixer.render(block);

                    for (frame, sample) in chunk.chunks_mut(channels).zip(block.iter()) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
