//! PlaybackService - one gapless playback session at a time
//!
//! The service owns the output stage, the clip cache and the session state.
//! Clip fetches run as spawned tasks and report back tagged with a request
//! id; a reply for a request that has since been superseded only fills the
//! clip cache.
//!
//! ```text
//!            play(new)                 clip ready
//!   Idle ──────────────► Scheduling ─────────────► Playing
//!    ▲                       │ fail / superseded      │ stop / toggle
//!    │                       ▼                        ▼
//!    └────────────────────── Idle ◄── suspend ── Stopping (segments fading)
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::messages::{EventBus, PlaybackCommand, ServiceHandle, SpectrumEvent};
use crate::config::PlaybackConfig;
use crate::engine::SegmentId;
use crate::playback::{
    decode_wav, AudioClip, ClipCache, ClipHandle, ClipProvider, LoopScheduler, OutputStage,
    PlayRequest, PlayState, PlaybackError, PlaybackResult,
};
use crate::types::ClipKey;

const SERVICE_NAME: &str = "PlaybackService";

enum Phase {
    Idle,
    /// Waiting for a clip
    Scheduling {
        request_id: u64,
        identity: String,
        reply: oneshot::Sender<PlaybackResult<PlayState>>,
    },
    Playing {
        identity: String,
        scheduler: LoopScheduler,
    },
}

/// Messages the service posts to itself from spawned tasks
enum Internal {
    ClipReady {
        request_id: u64,
        key: ClipKey,
        result: PlaybackResult<AudioClip>,
    },
    SuspendDue {
        generation: u64,
    },
}

pub struct PlaybackService<C: ClipProvider, O: OutputStage> {
    provider: Arc<C>,
    output: O,
    config: PlaybackConfig,
    clips: ClipCache,
    phase: Phase,
    /// Faded segments not yet reported ended
    draining: Vec<SegmentId>,
    next_request_id: u64,
    /// Bumped on every start and stop; a suspend timer only fires for its own
    suspend_generation: u64,
    command_rx: mpsc::UnboundedReceiver<PlaybackCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events: EventBus,
}

impl<C: ClipProvider, O: OutputStage> PlaybackService<C, O> {
    /// Spawn the service on the current tokio runtime
    pub fn spawn(
        provider: Arc<C>,
        output: O,
        config: PlaybackConfig,
        events: EventBus,
    ) -> ServiceHandle<PlaybackCommand> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let service = PlaybackService {
            provider,
            output,
            config,
            clips: ClipCache::new(),
            phase: Phase::Idle,
            draining: Vec::new(),
            next_request_id: 0,
            suspend_generation: 0,
            command_rx,
            internal_tx,
            internal_rx,
            events: events.clone(),
        };

        let task = tokio::spawn(service.run());

        events.publish(SpectrumEvent::ServiceStarted {
            service_name: SERVICE_NAME.to_string(),
        });

        ServiceHandle {
            command_tx,
            task: Some(task),
        }
    }

    /// Main service loop
    async fn run(mut self) {
        log::info!("PlaybackService started");

        let mut ticker = tokio::time::interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let ticking = self.needs_tick();
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(PlaybackCommand::Shutdown) | None => {
                        log::info!("PlaybackService shutting down");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(msg) = self.internal_rx.recv() => self.handle_internal(msg),
                _ = ticker.tick(), if ticking => self.on_tick(),
            }
        }

        self.stop();

        self.events.publish(SpectrumEvent::ServiceStopped {
            service_name: SERVICE_NAME.to_string(),
        });
        log::info!("PlaybackService stopped");
    }

    fn handle_command(&mut self, cmd: PlaybackCommand) {
        match cmd {
            PlaybackCommand::Play { request, reply } => self.play(request, reply),

            PlaybackCommand::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }

            PlaybackCommand::IsPlaying { identity, reply } => {
                let playing = matches!(&self.phase, Phase::Playing { identity: current, .. } if *current == identity);
                let _ = reply.send(playing);
            }

            // Handled in run()
            PlaybackCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::ClipReady {
                request_id,
                key,
                result,
            } => self.on_clip_ready(request_id, key, result),
            Internal::SuspendDue { generation } => self.on_suspend_due(generation),
        }
    }

    fn current_identity(&self) -> Option<&str> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Scheduling { identity, .. } | Phase::Playing { identity, .. } => {
                Some(identity.as_str())
            }
        }
    }

    fn needs_tick(&self) -> bool {
        matches!(self.phase, Phase::Playing { .. }) || !self.draining.is_empty()
    }

    fn play(&mut self, request: PlayRequest, reply: oneshot::Sender<PlaybackResult<PlayState>>) {
        // Same curve again toggles playback off
        if self.current_identity() == Some(request.identity.as_str()) {
            log::debug!("Toggling off playback of {}", request.identity);
            self.stop();
            let _ = reply.send(Ok(PlayState::Stopped));
            return;
        }
        if !request.supports_audio {
            log::debug!("No audio for {}, keeping current playback", request.identity);
            let _ = reply.send(Err(PlaybackError::AudioUnsupported(request.identity)));
            return;
        }

        // A rejected operating point still ends the current loop
        self.stop();

        if !(request.point.is_finite() && request.point > 0.0) {
            let _ = reply.send(Err(PlaybackError::InvalidOperatingPoint(request.point)));
            return;
        }

        let key = ClipKey::new(request.model, request.point);
        if let Some(clip) = self.clips.get(&key) {
            log::debug!("Clip {} cached", key);
            self.begin_playing(request.identity, clip, reply);
            return;
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        log::debug!("Fetching clip {} for {}", key, request.identity);

        let provider = Arc::clone(&self.provider);
        let tx = self.internal_tx.clone();
        let (model, point) = (request.model, request.point);
        tokio::spawn(async move {
            let result = match provider.fetch_clip(model, point).await {
                Ok(bytes) => decode_wav(&bytes).map_err(PlaybackError::from),
                Err(e) => Err(PlaybackError::from(e)),
            };
            let _ = tx.send(Internal::ClipReady {
                request_id,
                key,
                result,
            });
        });

        self.phase = Phase::Scheduling {
            request_id,
            identity: request.identity,
            reply,
        };
    }

    fn on_clip_ready(&mut self, request_id: u64, key: ClipKey, result: PlaybackResult<AudioClip>) {
        // Cache even when superseded: the user may come back to this point
        let result = result.map(|clip| self.clips.insert(key, clip));

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Scheduling {
                request_id: current,
                identity,
                reply,
            } if current == request_id => match result {
                Ok(clip) => self.begin_playing(identity, clip, reply),
                Err(e) => {
                    log::warn!("Playback of {} failed: {}", identity, e);
                    let _ = reply.send(Err(e));
                }
            },
            other => {
                log::debug!("Clip {} arrived for a superseded request", key);
                self.phase = other;
            }
        }
    }

    fn begin_playing(
        &mut self,
        identity: String,
        clip: ClipHandle,
        reply: oneshot::Sender<PlaybackResult<PlayState>>,
    ) {
        // Cancel any pending suspend
        self.suspend_generation += 1;

        if self.output.is_suspended() {
            if let Err(e) = self.output.resume() {
                log::error!("Failed to resume audio output: {}", e);
                let _ = reply.send(Err(e));
                return;
            }
        }

        match LoopScheduler::start(&mut self.output, clip, &self.config) {
            Ok(scheduler) => {
                log::info!(
                    "Playing {} (loop step {:.3}s)",
                    identity,
                    scheduler.envelope().step()
                );
                self.events.publish(SpectrumEvent::PlaybackStarted {
                    identity: identity.clone(),
                });
                self.phase = Phase::Playing {
                    identity,
                    scheduler,
                };
                let _ = reply.send(Ok(PlayState::Playing));
            }
            Err(e) => {
                log::error!("Failed to schedule {}: {}", identity, e);
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Return to Idle, fading out whatever is sounding
    fn stop(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {}
            Phase::Scheduling { identity, reply, .. } => {
                log::debug!("Abandoning clip request for {}", identity);
                let _ = reply.send(Ok(PlayState::Stopped));
            }
            Phase::Playing {
                identity,
                scheduler,
            } => {
                let faded = scheduler.stop(
                    &mut self.output,
                    self.config.fade_out(),
                    self.config.stop_buffer(),
                );
                log::info!("Stopped {} ({} segments fading)", identity, faded.len());
                self.draining.extend(faded);
                self.events.publish(SpectrumEvent::PlaybackStopped { identity });
                self.schedule_suspend();
            }
        }
    }

    fn schedule_suspend(&mut self) {
        self.suspend_generation += 1;
        let generation = self.suspend_generation;
        let delay = self.config.suspend_after();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::SuspendDue { generation });
        });
    }

    fn on_suspend_due(&mut self, generation: u64) {
        if generation != self.suspend_generation || !matches!(self.phase, Phase::Idle) {
            return;
        }
        if !self.draining.is_empty() {
            log::debug!("Dropping {} unfinished segments", self.draining.len());
        }
        self.draining.clear();
        let result = self.output.clear().and_then(|_| self.output.suspend());
        if let Err(e) = result {
            log::warn!("Failed to suspend audio output: {}", e);
        }
    }

    fn on_tick(&mut self) {
        let ended = self.output.take_ended();
        if !ended.is_empty() {
            self.draining.retain(|id| !ended.contains(id));
        }

        let failed = match &mut self.phase {
            Phase::Playing { scheduler, .. } => {
                scheduler.release_ended(&ended);
                scheduler.tick(&mut self.output).err()
            }
            _ => None,
        };
        if let Some(e) = failed {
            log::error!("Loop scheduling failed: {}", e);
            self.stop();
        }
    }
}

/// Async client for the PlaybackService
#[derive(Clone)]
pub struct PlaybackClient {
    command_tx: mpsc::UnboundedSender<PlaybackCommand>,
}

impl PlaybackClient {
    pub fn new(handle: &ServiceHandle<PlaybackCommand>) -> Self {
        Self {
            command_tx: handle.command_tx.clone(),
        }
    }

    /// Start playback, or stop it when `request.identity` is already playing
    pub async fn play(&self, request: PlayRequest) -> PlaybackResult<PlayState> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::Play { request, reply: tx })
            .map_err(|_| PlaybackError::ServiceUnavailable)?;
        rx.await.map_err(|_| PlaybackError::ServiceUnavailable)?
    }

    pub async fn stop(&self) -> PlaybackResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::Stop { reply: tx })
            .map_err(|_| PlaybackError::ServiceUnavailable)?;
        rx.await.map_err(|_| PlaybackError::ServiceUnavailable)
    }

    pub async fn is_playing(&self, identity: impl Into<String>) -> PlaybackResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::IsPlaying {
                identity: identity.into(),
                reply: tx,
            })
            .map_err(|_| PlaybackError::ServiceUnavailable)?;
        rx.await.map_err(|_| PlaybackError::ServiceUnavailable)
    }

    pub fn shutdown(&self) -> PlaybackResult<()> {
        self.command_tx
            .send(PlaybackCommand::Shutdown)
            .map_err(|_| PlaybackError::ServiceUnavailable)
    }
}
