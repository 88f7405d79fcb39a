//! Background services for fanscope-core
//!
//! Message-driven actors that own mutable state exclusively, so nothing in
//! the UI path ever takes a lock around cache or playback state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    Commands     ┌───────────────────┐   fetch_models
//! │  Controller │ ─────────────►  │ ModelCacheService │ ──────────────► provider
//! │             │ ◄───────────── │  (single flight)  │
//! │             │    Replies      └───────────────────┘
//! │             │                 ┌───────────────────┐   fetch_clip
//! │             │ ─────────────►  │  PlaybackService  │ ──────────────► provider
//! └─────────────┘                 └───────────────────┘
//!       ▲                                │ rtrb        │ Publish
//!       │ Subscribe                      ▼             ▼
//!       │                          LoopMixer     ┌───────────┐
//!       └────────────────────────────────────────│ Event Bus │
//!                                                └───────────┘
//! ```
//!
//! # Services
//!
//! - [`ModelCacheService`] - coalesced spectrum model fetching with retry
//! - [`PlaybackService`] - gapless loop playback sessions

mod messages;
mod model_cache;
mod playback;

pub use messages::*;
pub use model_cache::{ModelCacheClient, ModelCacheService};
pub use playback::{PlaybackClient, PlaybackService};
