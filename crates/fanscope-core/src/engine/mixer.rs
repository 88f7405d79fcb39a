//! Segment mixer (render side)
//!
//! [`LoopMixer`] renders scheduled clip copies against its own sample clock.
//! It is owned by the audio callback (or by a test driving it offline) and
//! talks to the control side only through the rtrb rings and
//! [`MixerAtomics`].
//!
//! ```text
//! PlaybackService ──MixerCommand──► LoopMixer::render() ──► device
//!  (MixerOutput)  ◄──ended ids────       │
//!        ▲                               │ frames_rendered
//!        └────────── MixerAtomics ◄──────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use super::command::{command_channel, ended_channel, MixerCommand, SegmentId};
use super::envelope::GainEnvelope;
use super::limiter::PeakLimiter;
use crate::playback::AudioClip;
use crate::types::StereoSample;

/// Voices that can sound (or wait to sound) at once
pub const MAX_VOICES: usize = 32;

/// Render-side state shared with the control side
#[derive(Debug, Default)]
pub struct MixerAtomics {
    pub frames_rendered: AtomicU64,
    pub sample_rate: AtomicU32,
    pub suspended: AtomicBool,
    pub active_voices: AtomicUsize,
}

impl MixerAtomics {
    /// Output clock in seconds
    pub fn now(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Relaxed).max(1);
        self.frames_rendered.load(Ordering::Acquire) as f64 / rate as f64
    }
}

struct Fade {
    start_frame: u64,
    length: u64,
    from: f32,
}

struct Voice {
    id: SegmentId,
    clip: Shared<AudioClip>,
    start_frame: u64,
    /// Natural end or stop time, whichever is first
    end_frame: u64,
    envelope: GainEnvelope,
    fade: Option<Fade>,
}

impl Voice {
    fn gain_at(&self, frame: u64, rate: f64) -> f32 {
        if frame < self.start_frame || frame >= self.end_frame {
            return 0.0;
        }
        match &self.fade {
            Some(fade) if frame >= fade.start_frame => {
                let done = (frame - fade.start_frame) as f32 / fade.length.max(1) as f32;
                fade.from * (1.0 - done).max(0.0)
            }
            _ => {
                let t = (frame - self.start_frame) as f64 / rate;
                self.envelope.gain_at(t) as f32
            }
        }
    }

    fn render_into(&self, out: &mut [StereoSample], first_frame: u64, rate: f64) {
        for (i, sample) in out.iter_mut().enumerate() {
            let frame = first_frame + i as u64;
            let gain = self.gain_at(frame, rate);
            if gain == 0.0 {
                continue;
            }
            let t = (frame - self.start_frame) as f64 / rate;
            *sample += self.clip.sample_at(t) * gain;
        }
    }
}

/// Renders scheduled segments through master gain and limiter
pub struct LoopMixer {
    sample_rate: u32,
    frame: u64,
    voices: Vec<Voice>,
    master_gain: f32,
    limiter: PeakLimiter,
    suspended: bool,
    commands: rtrb::Consumer<MixerCommand>,
    ended: rtrb::Producer<SegmentId>,
    atomics: Arc<MixerAtomics>,
}

impl LoopMixer {
    /// Create a mixer and its control-side handle
    pub fn new(sample_rate: u32, master_gain: f32, ceiling_db: f32) -> (LoopMixer, MixerOutput) {
        let sample_rate = sample_rate.max(1);
        let (command_tx, command_rx) = command_channel();
        let (ended_tx, ended_rx) = ended_channel();
        let atomics = Arc::new(MixerAtomics::default());
        atomics.sample_rate.store(sample_rate, Ordering::Relaxed);

        let mixer = LoopMixer {
            sample_rate,
            frame: 0,
            voices: Vec::with_capacity(MAX_VOICES),
            master_gain,
            limiter: PeakLimiter::new(sample_rate, ceiling_db),
            suspended: false,
            commands: command_rx,
            ended: ended_tx,
            atomics: Arc::clone(&atomics),
        };
        let output = MixerOutput {
            commands: command_tx,
            ended: ended_rx,
            atomics,
            next_id: 1,
        };
        (mixer, output)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render one block
    ///
    /// Drains pending commands first. While suspended the block is silent
    /// and the clock does not advance.
    pub fn render(&mut self, out: &mut [StereoSample]) {
        self.process_commands();
        out.fill(StereoSample::silence());
        if self.suspended {
            return;
        }

        let rate = self.sample_rate as f64;
        for voice in &self.voices {
            voice.render_into(out, self.frame, rate);
        }
        if self.master_gain != 1.0 {
            for sample in out.iter_mut() {
                *sample *= self.master_gain;
            }
        }
        self.limiter.process(out);

        self.frame += out.len() as u64;
        self.retire_finished();
        self.atomics.frames_rendered.store(self.frame, Ordering::Release);
        self.atomics
            .active_voices
            .store(self.voices.len(), Ordering::Relaxed);
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                MixerCommand::Schedule {
                    id,
                    clip,
                    start,
                    envelope,
                } => self.schedule(id, clip, start, envelope),
                MixerCommand::FadeOut {
                    id,
                    at,
                    fade,
                    stop_at,
                } => self.fade_out(id, at, fade, stop_at),
                MixerCommand::Clear => {
                    for voice in self.voices.drain(..) {
                        let _ = self.ended.push(voice.id);
                    }
                }
                MixerCommand::Suspend => {
                    self.suspended = true;
                    self.limiter.reset();
                    self.atomics.suspended.store(true, Ordering::Release);
                }
                MixerCommand::Resume => {
                    self.suspended = false;
                    self.atomics.suspended.store(false, Ordering::Release);
                }
            }
        }
    }

    fn to_frame(&self, secs: f64) -> u64 {
        if secs.is_finite() {
            (secs.max(0.0) * self.sample_rate as f64).round() as u64
        } else {
            u64::MAX
        }
    }

    fn schedule(&mut self, id: SegmentId, clip: Shared<AudioClip>, start: f64, envelope: GainEnvelope) {
        if self.voices.len() >= MAX_VOICES {
            let _ = self.ended.push(id);
            return;
        }
        // A start in the past begins now
        let start_frame = self.to_frame(start).max(self.frame);
        let length = self.to_frame(envelope.duration);
        self.voices.push(Voice {
            id,
            clip,
            start_frame,
            end_frame: start_frame.saturating_add(length),
            envelope,
            fade: None,
        });
    }

    fn fade_out(&mut self, id: SegmentId, at: f64, fade: f64, stop_at: f64) {
        let rate = self.sample_rate as f64;
        let at_frame = self.to_frame(at).max(self.frame);
        let length = self.to_frame(fade);
        let stop_frame = self.to_frame(stop_at).max(at_frame);

        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            let from = voice.gain_at(at_frame, rate);
            voice.fade = Some(Fade {
                start_frame: at_frame,
                length,
                from,
            });
            voice.end_frame = voice.end_frame.min(stop_frame);
        }
    }

    fn retire_finished(&mut self) {
        let mut i = self.voices.len();
        while i > 0 {
            i -= 1;
            if self.voices[i].end_frame <= self.frame {
                let voice = self.voices.swap_remove(i);
                let _ = self.ended.push(voice.id);
            }
        }
    }
}

/// Control-side handle of a [`LoopMixer`]
pub struct MixerOutput {
    commands: rtrb::Producer<MixerCommand>,
    ended: rtrb::Consumer<SegmentId>,
    atomics: Arc<MixerAtomics>,
    next_id: SegmentId,
}

impl MixerOutput {
    pub fn atomics(&self) -> &Arc<MixerAtomics> {
        &self.atomics
    }

    /// Push a command; false when the ring is full
    pub fn send(&mut self, cmd: MixerCommand) -> bool {
        self.commands.push(cmd).is_ok()
    }

    pub fn next_segment_id(&mut self) -> SegmentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Drain ids of segments the render side has finished
    pub fn drain_ended(&mut self) -> Vec<SegmentId> {
        let mut out = Vec::new();
        while let Ok(id) = self.ended.pop() {
            out.push(id);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;

    const RATE: u32 = 8_000;
    const BLOCK: usize = 64;

    fn dc_clip(level: f32, secs: f64) -> Shared<AudioClip> {
        let frames = vec![StereoSample::mono(level); (secs * RATE as f64) as usize];
        Shared::new(&gc_handle(), AudioClip::new(frames, RATE))
    }

    /// Render `secs` of audio, returning the left channel
    fn render(mixer: &mut LoopMixer, secs: f64) -> Vec<f32> {
        let blocks = (secs * RATE as f64) as usize / BLOCK;
        let mut out = Vec::new();
        let mut buf = vec![StereoSample::silence(); BLOCK];
        for _ in 0..blocks {
            mixer.render(&mut buf);
            out.extend(buf.iter().map(|s| s.left));
        }
        out
    }

    fn schedule(output: &mut MixerOutput, clip: &Shared<AudioClip>, start: f64) -> SegmentId {
        let id = output.next_segment_id();
        let envelope = GainEnvelope::for_clip(clip.duration(), 0.05);
        assert!(output.send(MixerCommand::Schedule {
            id,
            clip: Shared::clone(clip),
            start,
            envelope,
        }));
        id
    }

    #[test]
    fn test_crossfaded_copies_leave_no_gap() {
        let (mut mixer, mut output) = LoopMixer::new(RATE, 1.0, 0.0);
        let clip = dc_clip(0.1, 0.5);
        let step = GainEnvelope::for_clip(0.5, 0.05).step();
        let first = schedule(&mut output, &clip, 0.1);
        let second = schedule(&mut output, &clip, 0.1 + step);

        let left = render(&mut mixer, 1.2);
        let (from, to) = ((0.16 * RATE as f64) as usize, (0.99 * RATE as f64) as usize);
        for (i, v) in left[from..to].iter().enumerate() {
            assert!(*v >= 0.0999, "dip to {} at frame {}", v, from + i);
        }
        assert!(left[..(0.1 * RATE as f64) as usize].iter().all(|v| *v == 0.0));

        let mut ended = output.drain_ended();
        ended.sort();
        assert_eq!(ended, vec![first, second]);
        assert_eq!(output.atomics().active_voices.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_fade_out_silences_and_reports_end() {
        let (mut mixer, mut output) = LoopMixer::new(RATE, 1.0, 0.0);
        let clip = dc_clip(0.1, 2.0);
        let id = schedule(&mut output, &clip, 0.0);

        render(&mut mixer, 0.5);
        let now = output.atomics().now();
        assert!(output.send(MixerCommand::FadeOut {
            id,
            at: now,
            fade: 0.03,
            stop_at: now + 0.04,
        }));
        let left = render(&mut mixer, 0.2);

        // 30 ms ramp plus the limiter's lookahead, then silence
        let silent_from = ((0.03 + 0.002) * RATE as f64) as usize;
        assert!(left[0] > 0.05);
        assert!(left[silent_from..].iter().all(|v| v.abs() < 1e-6));
        assert_eq!(output.drain_ended(), vec![id]);
    }

    #[test]
    fn test_suspend_freezes_clock() {
        let (mut mixer, mut output) = LoopMixer::new(RATE, 1.0, 0.0);
        render(&mut mixer, 0.1);
        let before = output.atomics().now();

        assert!(output.send(MixerCommand::Suspend));
        render(&mut mixer, 0.1);
        assert_eq!(output.atomics().now(), before);
        assert!(output.atomics().suspended.load(Ordering::Acquire));

        assert!(output.send(MixerCommand::Resume));
        render(&mut mixer, 0.1);
        assert!(output.atomics().now() > before);
    }

    #[test]
    fn test_master_gain_is_limited() {
        let (mut mixer, mut output) = LoopMixer::new(RATE, 5.0, -1.0);
        let clip = dc_clip(0.5, 1.0);
        schedule(&mut output, &clip, 0.0);

        let left = render(&mut mixer, 0.5);
        let ceiling = 10f32.powf(-1.0 / 20.0);
        assert!(left[(0.2 * RATE as f64) as usize..]
            .iter()
            .all(|v| *v <= ceiling * 1.05));
    }

    #[test]
    fn test_clear_reports_all_voices() {
        let (mut mixer, mut output) = LoopMixer::new(RATE, 1.0, 0.0);
        let clip = dc_clip(0.1, 1.0);
        let a = schedule(&mut output, &clip, 0.0);
        let b = schedule(&mut output, &clip, 0.5);
        render(&mut mixer, 0.1);

        assert!(output.send(MixerCommand::Clear));
        render(&mut mixer, 0.01);
        let mut ended = output.drain_ended();
        ended.sort();
        assert_eq!(ended, vec![a, b]);
    }
}
