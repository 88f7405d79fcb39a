//! Lookahead peak limiter for the master chain
//!
//! Sits after the master gain:
//!   voices → master gain (×5 by default) → **limiter** → output
//!
//! Fan recordings are quiet, so the master gain is large; the limiter keeps
//! the boosted signal under the ceiling without clipping.
//!
//! # Algorithm
//!
//! 1. Input is written to a delay line of `lookahead` samples.
//! 2. Each input's stereo peak yields a target gain (`ceiling / peak`, or 1).
//! 3. The minimum target over the lookahead window is the gain that must be
//!    reached by the time the delayed sample is output.
//! 4. A one-pole follower smooths the gain: fast attack (99 % within the
//!    lookahead), 100 ms release.

use crate::types::StereoSample;

/// Ring-buffer size (covers the lookahead up to 192 kHz)
const MAX_DELAY: usize = 1024;

const LOOKAHEAD_SECS: f32 = 0.0015;

const RELEASE_SECS: f32 = 0.1;

/// ln(0.01): attack reaches 99 % of its target within the lookahead
const LN_ONE_PERCENT: f32 = -4.605_17;

pub struct PeakLimiter {
    /// Ceiling in linear amplitude
    ceiling: f32,
    lookahead: usize,
    delay: Box<[StereoSample; MAX_DELAY]>,
    target_gains: Box<[f32; MAX_DELAY]>,
    write_pos: usize,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl PeakLimiter {
    pub fn new(sample_rate: u32, ceiling_db: f32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let lookahead = ((LOOKAHEAD_SECS * sample_rate).round() as usize).clamp(1, MAX_DELAY - 1);

        Self {
            ceiling: 10.0_f32.powf(ceiling_db / 20.0),
            lookahead,
            delay: Box::new([StereoSample::silence(); MAX_DELAY]),
            target_gains: Box::new([1.0; MAX_DELAY]),
            write_pos: 0,
            gain: 1.0,
            attack_coeff: (LN_ONE_PERCENT / lookahead as f32).exp(),
            release_coeff: (-1.0 / (RELEASE_SECS * sample_rate)).exp(),
        }
    }

    /// Delay introduced by the limiter
    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    /// Current gain reduction factor (1.0 = none)
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Limit a block in place
    pub fn process(&mut self, block: &mut [StereoSample]) {
        for sample in block.iter_mut() {
            let peak = sample.peak();
            self.target_gains[self.write_pos] = if peak > self.ceiling {
                self.ceiling / peak
            } else {
                1.0
            };

            let wanted = self.window_min_gain();
            let coeff = if wanted < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = self.gain * coeff + wanted * (1.0 - coeff);

            let read_pos = (self.write_pos + MAX_DELAY - self.lookahead) % MAX_DELAY;
            let delayed = self.delay[read_pos];
            self.delay[self.write_pos] = *sample;
            *sample = delayed * self.gain;

            self.write_pos = (self.write_pos + 1) % MAX_DELAY;
        }
    }

    /// Drop the delay line and gain state (used on suspend)
    pub fn reset(&mut self) {
        self.delay.fill(StereoSample::silence());
        self.target_gains.fill(1.0);
        self.gain = 1.0;
    }

    #[inline]
    fn window_min_gain(&self) -> f32 {
        (0..self.lookahead)
            .map(|i| self.target_gains[(self.write_pos + MAX_DELAY - i) % MAX_DELAY])
            .fold(1.0_f32, f32::min)
    }
}
