//! Output stage seam
//!
//! The scheduler only needs an output clock and a way to place, fade and
//! retire clip copies. [`MixerOutput`] implements this over the lock-free
//! rings of a [`LoopMixer`](crate::engine::LoopMixer); tests substitute a
//! recording fake.

use std::sync::atomic::Ordering;

use super::clip::ClipHandle;
use super::error::{PlaybackError, PlaybackResult};
use crate::engine::{GainEnvelope, MixerCommand, MixerOutput, SegmentId};

pub trait OutputStage: Send + 'static {
    /// Output clock in seconds
    fn current_time(&self) -> f64;

    /// Place a copy of `clip` starting at `start` on the output clock
    fn schedule(
        &mut self,
        clip: &ClipHandle,
        start: f64,
        envelope: GainEnvelope,
    ) -> PlaybackResult<SegmentId>;

    /// Ramp a segment from its current gain to 0 over `fade` seconds
    /// starting at `at`, and stop it at `stop_at`
    fn fade_out(&mut self, id: SegmentId, at: f64, fade: f64, stop_at: f64) -> PlaybackResult<()>;

    /// Ids of segments that have finished since the last call
    fn take_ended(&mut self) -> Vec<SegmentId>;

    fn resume(&mut self) -> PlaybackResult<()>;

    fn suspend(&mut self) -> PlaybackResult<()>;

    fn is_suspended(&self) -> bool;

    /// Drop every segment immediately
    fn clear(&mut self) -> PlaybackResult<()>;
}

impl MixerOutput {
    fn push(&mut self, cmd: MixerCommand) -> PlaybackResult<()> {
        if self.send(cmd) {
            Ok(())
        } else {
            Err(PlaybackError::Output("mixer command queue full".to_string()))
        }
    }
}

impl OutputStage for MixerOutput {
    fn current_time(&self) -> f64 {
        self.atomics().now()
    }

    fn schedule(
        &mut self,
        clip: &ClipHandle,
        start: f64,
        envelope: GainEnvelope,
    ) -> PlaybackResult<SegmentId> {
        let id = self.next_segment_id();
        self.push(MixerCommand::Schedule {
            id,
            clip: ClipHandle::clone(clip),
            start,
            envelope,
        })?;
        Ok(id)
    }

    fn fade_out(&mut self, id: SegmentId, at: f64, fade: f64, stop_at: f64) -> PlaybackResult<()> {
        self.push(MixerCommand::FadeOut {
            id,
            at,
            fade,
            stop_at,
        })
    }

    fn take_ended(&mut self) -> Vec<SegmentId> {
        self.drain_ended()
    }

    fn resume(&mut self) -> PlaybackResult<()> {
        self.push(MixerCommand::Resume)
    }

    fn suspend(&mut self) -> PlaybackResult<()> {
        self.push(MixerCommand::Suspend)
    }

    fn is_suspended(&self) -> bool {
        self.atomics().suspended.load(Ordering::Acquire)
    }

    fn clear(&mut self) -> PlaybackResult<()> {
        self.push(MixerCommand::Clear)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{gc_handle, LoopMixer};
    use crate::playback::AudioClip;
    use crate::types::StereoSample;

    #[test]
    fn test_mixer_output_drives_render_side() {
        let (mut mixer, mut output) = LoopMixer::new(8_000, 1.0, 0.0);
        let clip = ClipHandle::new(
            &gc_handle(),
            AudioClip::new(vec![StereoSample::mono(0.2); 800], 8_000),
        );

        let id = output
            .schedule(&clip, 0.0, GainEnvelope::for_clip(clip.duration(), 0.05))
            .unwrap();
        let mut buf = vec![StereoSample::silence(); 1024];
        mixer.render(&mut buf);

        assert!(output.current_time() > 0.12);
        assert_eq!(output.take_ended(), vec![id]);

        output.suspend().unwrap();
        mixer.render(&mut buf);
        assert!(output.is_suspended());
        output.resume().unwrap();
        mixer.render(&mut buf);
        assert!(!output.is_suspended());
    }
}
