//! Render engine - segment mixer, master chain, RT-safe plumbing
//!
//! - LoopMixer: renders scheduled clip copies against a sample clock
//! - GainEnvelope: per-copy crossfade shape
//! - PeakLimiter: lookahead limiter after the master gain
//! - Lock-free command/ended rings and deferred deallocation

mod command;
mod envelope;
mod gc;
mod limiter;
mod mixer;

pub use command::*;
pub use envelope::*;
pub use gc::*;
pub use limiter::*;
pub use mixer::*;
