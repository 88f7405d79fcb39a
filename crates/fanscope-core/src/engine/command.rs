//! Lock-free command queue to the render side
//!
//! The playback service pushes commands through an `rtrb` SPSC ring; the
//! render callback drains it at the start of every block, so nothing on the
//! audio thread ever waits on a lock. Ended segments travel back on a second
//! ring.
//!
//! Times are seconds on the output clock (`frames_rendered / sample_rate`).

use basedrop::Shared;

use super::envelope::GainEnvelope;
use crate::playback::AudioClip;

/// Identifies one scheduled copy of a clip
pub type SegmentId = u64;

/// Capacity of the command ring
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the ended-segment ring
pub const ENDED_QUEUE_CAPACITY: usize = 256;

/// Commands sent from the control side to the render side
pub enum MixerCommand {
    /// Start a copy of `clip` at `start` with its loop envelope
    Schedule {
        id: SegmentId,
        clip: Shared<AudioClip>,
        start: f64,
        envelope: GainEnvelope,
    },
    /// Ramp a segment from its current gain to 0 and stop it
    FadeOut {
        id: SegmentId,
        at: f64,
        fade: f64,
        stop_at: f64,
    },
    /// Drop every segment immediately
    Clear,
    /// Stop the clock and output silence
    Suspend,
    Resume,
}

pub fn command_channel() -> (rtrb::Producer<MixerCommand>, rtrb::Consumer<MixerCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

pub fn ended_channel() -> (rtrb::Producer<SegmentId>, rtrb::Consumer<SegmentId>) {
    rtrb::RingBuffer::new(ENDED_QUEUE_CAPACITY)
}
