//! Gapless loop scheduling
//!
//! A clip of duration `D` loops as overlapping copies started `D - C` apart,
//! each with a `C`-long equal-power fade at both ends. Copies are placed on
//! the output clock a little ahead of time by a periodic tick:
//!
//! ```text
//! now            now + schedule_ahead
//!  │──────────────────│
//!  ├── copy n ───────╲
//!  │            ╱─── copy n+1 ─────╲
//!  │                           ╱─── (scheduled on a later tick)
//! ```

use std::collections::BTreeSet;

use super::clip::ClipHandle;
use super::error::PlaybackResult;
use super::output::OutputStage;
use crate::config::PlaybackConfig;
use crate::engine::{GainEnvelope, SegmentId};

/// Copies placed by one tick at most; the rest wait for the next tick
pub const MAX_COPIES_PER_TICK: usize = 16;

/// Schedules copies of one clip for one playback session
pub struct LoopScheduler {
    clip: ClipHandle,
    envelope: GainEnvelope,
    schedule_ahead: f64,
    next_start: f64,
    active: BTreeSet<SegmentId>,
}

impl LoopScheduler {
    /// Begin a loop: the first copy starts `start_delay` after the current
    /// output clock
    pub fn start<O: OutputStage + ?Sized>(
        output: &mut O,
        clip: ClipHandle,
        config: &PlaybackConfig,
    ) -> PlaybackResult<Self> {
        let envelope = GainEnvelope::for_clip(clip.duration(), config.crossfade());
        let mut scheduler = Self {
            clip,
            envelope,
            schedule_ahead: config.schedule_ahead(),
            next_start: output.current_time() + config.start_delay(),
            active: BTreeSet::new(),
        };
        scheduler.tick(output)?;
        Ok(scheduler)
    }

    pub fn envelope(&self) -> GainEnvelope {
        self.envelope
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Segments scheduled and not yet reported ended
    pub fn active_segments(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.active.iter().copied()
    }

    /// Schedule the copies that start within the lookahead window, at most
    /// [`MAX_COPIES_PER_TICK`]
    ///
    /// Returns the number of copies placed.
    pub fn tick<O: OutputStage + ?Sized>(&mut self, output: &mut O) -> PlaybackResult<usize> {
        let horizon = output.current_time() + self.schedule_ahead;
        let mut placed = 0;
        while self.next_start < horizon && placed < MAX_COPIES_PER_TICK {
            let id = output.schedule(&self.clip, self.next_start, self.envelope)?;
            self.active.insert(id);
            self.next_start += self.envelope.step();
            placed += 1;
        }
        Ok(placed)
    }

    /// Forget segments the output reported as finished
    pub fn release_ended(&mut self, ended: &[SegmentId]) {
        for id in ended {
            self.active.remove(id);
        }
    }

    /// Fade every active segment to silence and stop it shortly after
    ///
    /// Returns the faded segment ids; they stay owned by the caller until
    /// the output reports them ended.
    pub fn stop<O: OutputStage + ?Sized>(
        self,
        output: &mut O,
        fade_out: f64,
        stop_buffer: f64,
    ) -> Vec<SegmentId> {
        let now = output.current_time();
        let stop_at = now + fade_out + stop_buffer;
        let mut faded = Vec::with_capacity(self.active.len());
        for id in self.active {
            match output.fade_out(id, now, fade_out, stop_at) {
                Ok(()) => faded.push(id),
                Err(e) => log::warn!("Failed to fade out segment {}: {}", id, e),
            }
        }
        faded
    }
}
