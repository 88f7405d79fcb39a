//! Gain envelope of one loop copy
//!
//! Each copy fades in over the crossfade with a quarter sine and out over
//! the final crossfade with a quarter cosine. Copies start `duration -
//! crossfade` apart, so the outgoing and incoming gains of an overlap are
//! `cos(u·π/2)` and `sin(u·π/2)` of the same `u`: an equal-power crossfade.

use std::f64::consts::FRAC_PI_2;

/// Share of the clip the crossfade may occupy at most
const MAX_CROSSFADE_SHARE: f64 = 0.49;

/// Minimum spacing between copy starts (seconds)
const MIN_STEP: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEnvelope {
    /// Crossfade length (seconds)
    pub crossfade: f64,
    /// Clip duration (seconds)
    pub duration: f64,
}

impl GainEnvelope {
    /// Envelope for a clip of `duration` with at most `max_crossfade`
    pub fn for_clip(duration: f64, max_crossfade: f64) -> Self {
        let duration = duration.max(0.0);
        let crossfade = max_crossfade.max(0.0).min(duration * MAX_CROSSFADE_SHARE);
        Self {
            crossfade,
            duration,
        }
    }

    /// Spacing between the starts of consecutive copies
    pub fn step(&self) -> f64 {
        (self.duration - self.crossfade).max(MIN_STEP)
    }

    /// Gain at `t` seconds into the copy; 0 outside `[0, duration)`
    pub fn gain_at(&self, t: f64) -> f64 {
        if !(t >= 0.0 && t < self.duration) {
            return 0.0;
        }
        let cf = self.crossfade;
        if cf <= 0.0 {
            return 1.0;
        }
        if t < cf {
            (t / cf * FRAC_PI_2).sin()
        } else if t > self.duration - cf {
            ((t - (self.duration - cf)) / cf * FRAC_PI_2).cos()
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_crossfade_capped_by_clip_length() {
        assert_eq!(GainEnvelope::for_clip(2.0, 0.05).crossfade, 0.05);
        assert_relative_eq!(GainEnvelope::for_clip(0.06, 0.05).crossfade, 0.0294, epsilon = 1e-12);
    }

    #[test]
    fn test_step() {
        assert_relative_eq!(GainEnvelope::for_clip(2.0, 0.05).step(), 1.95, epsilon = 1e-12);
        assert_eq!(GainEnvelope::for_clip(0.0, 0.05).step(), MIN_STEP);
    }

    #[test]
    fn test_shape() {
        let env = GainEnvelope::for_clip(2.0, 0.05);
        assert_eq!(env.gain_at(-0.01), 0.0);
        assert_eq!(env.gain_at(0.0), 0.0);
        assert_relative_eq!(env.gain_at(0.05), 1.0, epsilon = 1e-12);
        assert_eq!(env.gain_at(1.0), 1.0);
        assert_relative_eq!(env.gain_at(1.975), 0.5f64.sqrt(), epsilon = 1e-9);
        assert_eq!(env.gain_at(2.0), 0.0);
    }

    #[test]
    fn test_overlap_is_equal_power() {
        let env = GainEnvelope::for_clip(2.0, 0.05);
        let step = env.step();
        for i in 0..=50 {
            let t = step + i as f64 * 0.001;
            let outgoing = env.gain_at(t);
            let incoming = env.gain_at(t - step);
            assert_relative_eq!(outgoing.powi(2) + incoming.powi(2), 1.0, epsilon = 1e-9);
        }
    }
}
