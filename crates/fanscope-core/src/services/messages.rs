//! Message types for service communication
//!
//! Commands are request-reply using oneshot channels; events are broadcast
//! on the [`EventBus`] so the UI can re-render when background work (a retry
//! poll, a clip fetch) changes what it should show.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::cache::CacheResult;
use crate::models::SpectrumModel;
use crate::playback::{PlayState, PlaybackResult, PlayRequest};
use crate::types::ModelKey;

// ============================================================================
// Model cache commands
// ============================================================================

/// Commands sent to the ModelCacheService
pub enum CacheCommand {
    /// Make every wanted key resolved, missing or pending-with-retry
    Reconcile {
        wanted: BTreeSet<ModelKey>,
        reply: oneshot::Sender<CacheResult<CacheSnapshot>>,
    },

    /// Bump the epoch, cancel the retry timer and forget pending keys
    Reset { reply: oneshot::Sender<u64> },

    /// Coalescer counters
    Stats {
        reply: oneshot::Sender<CoalescerStats>,
    },

    Shutdown,
}

/// State of the cache as seen by one reconcile call
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub epoch: u64,
    /// Resolved models among the wanted keys
    pub models: HashMap<ModelKey, Arc<SpectrumModel>>,
    pub pending: BTreeSet<ModelKey>,
    pub missing: BTreeSet<ModelKey>,
    /// A fetch was still running when this snapshot was taken
    pub fetch_in_flight: bool,
}

impl CacheSnapshot {
    pub fn model(&self, key: &ModelKey) -> Option<&Arc<SpectrumModel>> {
        self.models.get(key)
    }
}

/// Coalescer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub epoch: u64,
    /// Provider calls issued
    pub fetches: u64,
    /// Reconcile passes run (caller-driven and follow-up)
    pub reconciliations: u64,
    /// Follow-up passes run because a call arrived mid-fetch
    pub reruns: u64,
    /// Retry polls issued
    pub retries: u64,
    /// Responses discarded because the epoch had moved on
    pub stale_responses: u64,
    pub resolved: usize,
    pub pending: usize,
    pub missing: usize,
}

// ============================================================================
// Playback commands
// ============================================================================

/// Commands sent to the PlaybackService
pub enum PlaybackCommand {
    Play {
        request: PlayRequest,
        reply: oneshot::Sender<PlaybackResult<PlayState>>,
    },

    Stop { reply: oneshot::Sender<()> },

    IsPlaying {
        identity: String,
        reply: oneshot::Sender<bool>,
    },

    Shutdown,
}

// ============================================================================
// Events (Broadcast)
// ============================================================================

/// Events broadcast by the services
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumEvent {
    /// New models were resolved (possibly by a background retry)
    ModelsUpdated { epoch: u64, keys: Vec<ModelKey> },

    /// Pending or missing sets changed
    PendingChanged {
        pending: Vec<ModelKey>,
        missing: Vec<ModelKey>,
    },

    /// A provider call failed
    FetchFailed { message: String },

    /// Playback started for a curve
    PlaybackStarted { identity: String },

    /// Playback stopped (toggle, explicit stop or failure)
    PlaybackStopped { identity: String },

    ServiceStarted { service_name: String },

    ServiceStopped { service_name: String },
}

// ============================================================================
// Service Handle
// ============================================================================

/// Handle for communicating with a background service task
pub struct ServiceHandle<Cmd> {
    /// Channel for sending commands to the service
    pub command_tx: mpsc::UnboundedSender<Cmd>,
    /// Task running the service loop
    pub task: Option<tokio::task::JoinHandle<()>>,
}

impl<Cmd> ServiceHandle<Cmd> {
    /// Send a command to the service
    pub fn send(&self, cmd: Cmd) -> Result<(), mpsc::error::SendError<Cmd>> {
        self.command_tx.send(cmd)
    }

    /// Check if the service is still running
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the service loop to exit
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Service task ended abnormally: {}", e);
            }
        }
    }
}

/// Event bus for broadcasting events to subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: crossbeam::channel::Sender<SpectrumEvent>,
    receiver: crossbeam::channel::Receiver<SpectrumEvent>,
}

impl EventBus {
    /// Create a new event bus with bounded capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(capacity);
        Self { sender, receiver }
    }

    pub fn sender(&self) -> crossbeam::channel::Sender<SpectrumEvent> {
        self.sender.clone()
    }

    pub fn subscribe(&self) -> crossbeam::channel::Receiver<SpectrumEvent> {
        self.receiver.clone()
    }

    /// Publish without blocking; events are dropped when nobody drains the bus
    pub fn publish(&self, event: SpectrumEvent) {
        if let Err(e) = self.sender.try_send(event) {
            log::trace!("EventBus: dropping event ({})", e);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();

        bus.publish(SpectrumEvent::ServiceStarted {
            service_name: "test".to_string(),
        });

        match rx.recv().unwrap() {
            SpectrumEvent::ServiceStarted { service_name } => {
                assert_eq!(service_name, "test");
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_full_bus_drops_instead_of_blocking() {
        let bus = EventBus::new(1);
        let rx = bus.subscribe();
        bus.publish(SpectrumEvent::FetchFailed { message: "a".into() });
        bus.publish(SpectrumEvent::FetchFailed { message: "b".into() });
        assert_eq!(rx.len(), 1);
    }
}
