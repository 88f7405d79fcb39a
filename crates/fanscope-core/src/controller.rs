//! Controller for the spectrum and playback surface
//!
//! One owned object that the UI talks to. It starts the model cache and
//! playback services, keeps the spectrum assembler (band caches and level
//! axis) and remembers what the last view reported as pending or missing.
//!
//! ```ignore
//! let mut controller = FanscopeController::spawn(config, models, clips, output);
//! let view = controller.build_series(&curves, OperatingPoint::rpm(1400.0), None).await?;
//! controller.play_curve(&curves[0], 1400.0).await?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::cache::{CacheResult, ModelProvider};
use crate::config::FanscopeConfig;
use crate::models::{FanCurve, SpectrumModel};
use crate::octave::OctaveResolution;
use crate::playback::{ClipProvider, OutputStage, PlayRequest, PlayState, PlaybackResult};
use crate::services::{
    CacheCommand, CoalescerStats, EventBus, ModelCacheClient, ModelCacheService, PlaybackClient,
    PlaybackCommand, PlaybackService, ServiceHandle, SpectrumEvent,
};
use crate::spectrum::{CurveSeries, SpectrumAssembler};
use crate::types::{ModelKey, OperatingPoint};

/// Everything the spectrum chart needs for one render
#[derive(Debug, Clone, Default)]
pub struct SpectrumView {
    /// One entry per visible curve, in input order
    pub series: Vec<CurveSeries>,
    pub level_axis_max: f64,
    pub pending: BTreeSet<ModelKey>,
    pub missing: BTreeSet<ModelKey>,
    /// Models may still arrive for this view
    pub fetch_in_flight: bool,
    pub epoch: u64,
}

impl SpectrumView {
    /// Whether any visible curve is still waiting for its model
    pub fn is_loading(&self) -> bool {
        self.fetch_in_flight || !self.pending.is_empty()
    }
}

pub struct FanscopeController {
    config: FanscopeConfig,
    cache: ModelCacheClient,
    playback: PlaybackClient,
    cache_handle: ServiceHandle<CacheCommand>,
    playback_handle: ServiceHandle<PlaybackCommand>,
    assembler: SpectrumAssembler,
    events: EventBus,
    pending: BTreeSet<ModelKey>,
    missing: BTreeSet<ModelKey>,
    /// Models resolved for the last view
    models: HashMap<ModelKey, Arc<SpectrumModel>>,
}

impl FanscopeController {
    /// Start the services on the current tokio runtime
    pub fn spawn<P, C, O>(
        config: FanscopeConfig,
        models: Arc<P>,
        clips: Arc<C>,
        output: O,
    ) -> Self
    where
        P: ModelProvider,
        C: ClipProvider,
        O: OutputStage,
    {
        let events = EventBus::default();
        let cache_handle = ModelCacheService::spawn(models, config.cache.clone(), events.clone());
        let playback_handle =
            PlaybackService::spawn(clips, output, config.playback.clone(), events.clone());

        let assembler =
            SpectrumAssembler::new(config.spectrum.clone(), config.cache.eval_cache_capacity);

        log::info!(
            "Controller ready (default resolution {})",
            config.spectrum.default_resolution
        );

        Self {
            cache: ModelCacheClient::new(&cache_handle),
            playback: PlaybackClient::new(&playback_handle),
            cache_handle,
            playback_handle,
            assembler,
            events,
            pending: BTreeSet::new(),
            missing: BTreeSet::new(),
            models: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &FanscopeConfig {
        &self.config
    }

    // =========================================================================
    // Spectrum
    // =========================================================================

    /// Spectrum series of `curves` at `target`
    ///
    /// Asks the cache for every curve's model first. Curves whose model is
    /// pending or missing come back with empty points; a
    /// [`SpectrumEvent::ModelsUpdated`] signals when building again is
    /// worthwhile. `resolution` defaults to the configured one.
    pub async fn build_series(
        &mut self,
        curves: &[FanCurve],
        target: OperatingPoint,
        resolution: Option<OctaveResolution>,
    ) -> CacheResult<SpectrumView> {
        let resolution = resolution.unwrap_or(self.config.spectrum.default_resolution);
        let snapshot = self.cache.reconcile(curves.iter().map(|c| c.model)).await?;

        let series = self
            .assembler
            .build_series(curves, target, resolution, &snapshot.models);
        let level_axis_max =
            self.assembler
                .level_axis_max(curves, resolution, &snapshot.models, false);

        self.pending = snapshot.pending.clone();
        self.missing = snapshot.missing.clone();
        self.models = snapshot.models;

        log::debug!(
            "Built {} series at {:?} {} ({} pending, {} missing)",
            series.len(),
            target.axis,
            target.value,
            snapshot.pending.len(),
            snapshot.missing.len()
        );

        Ok(SpectrumView {
            series,
            level_axis_max,
            pending: snapshot.pending,
            missing: snapshot.missing,
            fetch_in_flight: snapshot.fetch_in_flight,
            epoch: snapshot.epoch,
        })
    }

    /// Recompute the level-axis maximum for `curves` regardless of whether
    /// the visible set changed
    pub async fn refresh_level_axis(
        &mut self,
        curves: &[FanCurve],
        resolution: Option<OctaveResolution>,
    ) -> CacheResult<f64> {
        let resolution = resolution.unwrap_or(self.config.spectrum.default_resolution);
        let snapshot = self.cache.reconcile(curves.iter().map(|c| c.model)).await?;
        Ok(self
            .assembler
            .level_axis_max(curves, resolution, &snapshot.models, true))
    }

    /// Keys still being prepared as of the last view
    pub fn pending(&self) -> &BTreeSet<ModelKey> {
        &self.pending
    }

    /// Keys the provider reported permanently unavailable as of the last view
    pub fn missing(&self) -> &BTreeSet<ModelKey> {
        &self.missing
    }

    pub async fn stats(&self) -> CacheResult<CoalescerStats> {
        self.cache.stats().await
    }

    /// Full reconfiguration
    ///
    /// Cancels retry polling and any in-flight fetch and forgets pending
    /// keys. Resolved models stay cached. Returns the new epoch.
    pub async fn reset(&mut self) -> CacheResult<u64> {
        let epoch = self.cache.reset().await?;
        self.assembler.invalidate_axis();
        self.pending.clear();
        log::info!("Controller reset (epoch {})", epoch);
        Ok(epoch)
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Play `request`, or stop it if that curve is already playing
    pub async fn play(&self, request: PlayRequest) -> PlaybackResult<PlayState> {
        self.playback.play(request).await
    }

    /// Play `curve` at `point` RPM
    ///
    /// Audio support comes from the curve itself or from its model as of the
    /// last [`build_series`](Self::build_series).
    pub async fn play_curve(&self, curve: &FanCurve, point: f64) -> PlaybackResult<PlayState> {
        let model = self.models.get(&curve.model).map(Arc::as_ref);
        self.play(PlayRequest::for_curve(curve, model, point)).await
    }

    pub async fn stop(&self) -> PlaybackResult<()> {
        self.playback.stop().await
    }

    pub async fn is_playing(&self, identity: impl Into<String>) -> PlaybackResult<bool> {
        self.playback.is_playing(identity).await
    }

    // =========================================================================
    // Events & lifecycle
    // =========================================================================

    pub fn subscribe(&self) -> crossbeam::channel::Receiver<SpectrumEvent> {
        self.events.subscribe()
    }

    /// Stop playback, shut both services down and wait for them
    pub async fn shutdown(self) {
        log::info!("Controller shutting down");
        if let Err(e) = self.playback.stop().await {
            log::warn!("Stop before shutdown failed: {}", e);
        }
        if let Err(e) = self.playback.shutdown() {
            log::warn!("Playback service already gone: {}", e);
        }
        if let Err(e) = self.cache.shutdown() {
            log::warn!("Model cache service already gone: {}", e);
        }
        self.playback_handle.join().await;
        self.cache_handle.join().await;
    }
}
