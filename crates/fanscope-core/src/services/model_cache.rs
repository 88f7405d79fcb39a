//! ModelCacheService - single-flight spectrum model fetching
//!
//! The service runs as one tokio task that owns the [`ModelStore`]. Callers
//! ask it to reconcile a wanted key set; it fetches only what isn't settled,
//! never runs more than one provider call at a time and polls pending keys
//! on an epoch-tagged retry timer. Only keys in the latest wanted set are
//! polled; the timer is cancelled once nothing wanted is pending.
//!
//! ```text
//! Reconcile ──► all settled? ──yes──► reply from cache
//!                  │no
//!                  ▼
//!            fetch in flight? ──yes──► remember wanted, reply now
//!                  │no                 (one follow-up pass after completion)
//!                  ▼
//!            fetch unsettled − pending ──► FetchCompleted{epoch}
//!                                             │ stale epoch → discard
//!                                             ▼
//!                                    apply, pending → RetryDue{epoch} in 10 s
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::messages::{
    CacheCommand, CacheSnapshot, CoalescerStats, EventBus, ServiceHandle, SpectrumEvent,
};
use crate::cache::{CacheError, CacheResult, FetchError, ModelProvider, ModelStore};
use crate::config::CacheConfig;
use crate::models::ModelBatch;
use crate::types::ModelKey;

const SERVICE_NAME: &str = "ModelCacheService";

/// Messages the service posts to itself from spawned tasks
enum Internal {
    FetchCompleted {
        epoch: u64,
        result: Result<ModelBatch, FetchError>,
    },
    RetryDue {
        epoch: u64,
    },
}

/// A caller waiting on the in-flight fetch
struct Waiter {
    wanted: BTreeSet<ModelKey>,
    reply: oneshot::Sender<CacheResult<CacheSnapshot>>,
}

struct InFlight {
    epoch: u64,
    requested: BTreeSet<ModelKey>,
    waiter: Option<Waiter>,
}

pub struct ModelCacheService<P: ModelProvider> {
    provider: Arc<P>,
    config: CacheConfig,
    store: ModelStore,
    epoch: u64,
    in_flight: Option<InFlight>,
    /// Wanted set of the most recent reconcile
    wanted: BTreeSet<ModelKey>,
    /// Latest wanted set from calls that arrived mid-fetch
    rerun: Option<BTreeSet<ModelKey>>,
    retry_timer: Option<JoinHandle<()>>,
    consecutive_failures: u32,
    stats: CoalescerStats,
    command_rx: mpsc::UnboundedReceiver<CacheCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events: EventBus,
}

impl<P: ModelProvider> ModelCacheService<P> {
    /// Spawn the service on the current tokio runtime
    pub fn spawn(provider: Arc<P>, config: CacheConfig, events: EventBus) -> ServiceHandle<CacheCommand> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let service = ModelCacheService {
            provider,
            config,
            store: ModelStore::new(),
            epoch: 0,
            in_flight: None,
            wanted: BTreeSet::new(),
            rerun: None,
            retry_timer: None,
            consecutive_failures: 0,
            stats: CoalescerStats::default(),
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
        log::info!("ModelCacheService started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(CacheCommand::Shutdown) | None => {
                        log::info!("ModelCacheService shutting down");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(msg) = self.internal_rx.recv() => self.handle_internal(msg),
            }
        }

        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if let Some(waiter) = self.in_flight.take().and_then(|f| f.waiter) {
            let _ = waiter.reply.send(Err(CacheError::ServiceUnavailable));
        }

        self.events.publish(SpectrumEvent::ServiceStopped {
            service_name: SERVICE_NAME.to_string(),
        });
        log::info!("ModelCacheService stopped");
    }

    fn handle_command(&mut self, cmd: CacheCommand) {
        match cmd {
            CacheCommand::Reconcile { wanted, reply } => self.reconcile(wanted, Some(reply)),

            CacheCommand::Reset { reply } => {
                self.reset();
                let _ = reply.send(self.epoch);
            }

            CacheCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }

            // Handled in run()
            CacheCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::FetchCompleted { epoch, result } => self.on_fetch_completed(epoch, result),
            Internal::RetryDue { epoch } => self.on_retry_due(epoch),
        }
    }

    /// One reconciliation pass
    ///
    /// `reply` is `None` for follow-up passes; their results reach the UI
    /// through the event bus.
    fn reconcile(
        &mut self,
        wanted: BTreeSet<ModelKey>,
        reply: Option<oneshot::Sender<CacheResult<CacheSnapshot>>>,
    ) {
        self.stats.reconciliations += 1;

        self.wanted = wanted.clone();
        if self.prune_pending() {
            self.publish_pending();
        }

        let unsettled = self.store.unsettled(&wanted);
        if unsettled.is_empty() {
            log::trace!("reconcile: all {} wanted keys settled", wanted.len());
            reply_with(reply, Ok(self.snapshot(&wanted)));
            return;
        }

        if self.in_flight.is_some() {
            log::debug!("reconcile: fetch in flight, queueing follow-up pass");
            let snapshot = self.snapshot(&wanted);
            self.rerun = Some(wanted);
            reply_with(reply, Ok(snapshot));
            return;
        }

        // Pending keys are owned by the retry timer
        let pending = self.store.pending();
        let request: BTreeSet<ModelKey> = unsettled
            .into_iter()
            .filter(|key| !pending.contains(key))
            .collect();
        if request.is_empty() {
            reply_with(reply, Ok(self.snapshot(&wanted)));
            return;
        }

        let waiter = reply.map(|reply| Waiter { wanted, reply });
        self.start_fetch(request, waiter);
    }

    fn start_fetch(&mut self, requested: BTreeSet<ModelKey>, waiter: Option<Waiter>) {
        self.stats.fetches += 1;
        let epoch = self.epoch;
        let keys: Vec<ModelKey> = requested.iter().copied().collect();
        log::debug!("Fetching {} spectrum models (epoch {})", keys.len(), epoch);

        let provider = Arc::clone(&self.provider);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = provider.fetch_models(keys).await;
            let _ = tx.send(Internal::FetchCompleted { epoch, result });
        });

        self.in_flight = Some(InFlight {
            epoch,
            requested,
            waiter,
        });
    }

    fn on_fetch_completed(&mut self, epoch: u64, result: Result<ModelBatch, FetchError>) {
        let Some(flight) = self.in_flight.take() else {
            log::warn!("Fetch completion without a fetch in flight");
            return;
        };
        debug_assert_eq!(flight.epoch, epoch);

        if epoch != self.epoch {
            log::debug!(
                "Discarding fetch response from epoch {} (current {})",
                epoch,
                self.epoch
            );
            self.stats.stale_responses += 1;
            if let Some(waiter) = flight.waiter {
                let _ = waiter.reply.send(Err(CacheError::Superseded { epoch: self.epoch }));
            }
        } else {
            match result {
                Ok(batch) => self.apply_batch(&flight.requested, batch, flight.waiter),
                Err(e) => self.fail_fetch(e, flight.waiter),
            }
            self.schedule_retry();
        }

        if let Some(wanted) = self.rerun.take() {
            self.stats.reruns += 1;
            self.reconcile(wanted, None);
        }
    }

    fn apply_batch(&mut self, requested: &BTreeSet<ModelKey>, batch: ModelBatch, waiter: Option<Waiter>) {
        self.consecutive_failures = 0;
        let outcome = self.store.apply(requested, batch);
        let pruned = self.prune_pending();
        log::debug!(
            "Fetch applied: {} resolved, {} missing, {} pending",
            outcome.resolved.len(),
            outcome.missing.len(),
            self.store.pending().len()
        );

        if !outcome.resolved.is_empty() {
            self.events.publish(SpectrumEvent::ModelsUpdated {
                epoch: self.epoch,
                keys: outcome.resolved.clone(),
            });
        }
        if outcome.pending_changed || pruned || !outcome.missing.is_empty() {
            self.publish_pending();
        }

        if let Some(waiter) = waiter {
            let _ = waiter.reply.send(Ok(self.snapshot(&waiter.wanted)));
        }
    }

    fn fail_fetch(&mut self, error: FetchError, waiter: Option<Waiter>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        log::warn!("Spectrum model fetch failed: {}", error);
        self.events.publish(SpectrumEvent::FetchFailed {
            message: error.to_string(),
        });
        if let Some(waiter) = waiter {
            let _ = waiter.reply.send(Err(error.into()));
        }
    }

    /// Drop pending keys that are no longer wanted
    ///
    /// Cancels the retry timer when nothing is left to poll. Returns whether
    /// the pending set changed.
    fn prune_pending(&mut self) -> bool {
        let changed = self.store.retain_pending(&self.wanted);
        if changed {
            log::debug!("Stopped polling models outside the wanted set");
        }
        if self.store.pending().is_empty() {
            if let Some(timer) = self.retry_timer.take() {
                log::trace!("Nothing wanted is pending, cancelling poll");
                timer.abort();
            }
        }
        changed
    }

    /// Arm the retry timer if keys are pending and no timer is armed
    fn schedule_retry(&mut self) {
        if self.retry_timer.is_some() || self.store.pending().is_empty() {
            return;
        }
        let delay = self.config.backoff_delay(self.consecutive_failures);
        let epoch = self.epoch;
        let tx = self.internal_tx.clone();
        log::debug!(
            "{} models pending, polling again in {:?}",
            self.store.pending().len(),
            delay
        );
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::RetryDue { epoch });
        }));
    }

    fn on_retry_due(&mut self, epoch: u64) {
        if epoch != self.epoch {
            log::trace!("Ignoring retry from epoch {}", epoch);
            return;
        }
        self.retry_timer = None;

        // An in-flight fetch re-arms the timer when it completes
        if self.in_flight.is_some() {
            return;
        }
        let pending = self.store.pending().clone();
        if pending.is_empty() {
            return;
        }
        self.stats.retries += 1;
        self.start_fetch(pending, None);
    }

    fn reset(&mut self) {
        self.epoch += 1;
        log::info!("Model cache reset (epoch {})", self.epoch);

        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        self.rerun = None;
        self.consecutive_failures = 0;
        if self.store.clear_pending() {
            self.publish_pending();
        }
    }

    fn publish_pending(&self) {
        self.events.publish(SpectrumEvent::PendingChanged {
            pending: self.store.pending().iter().copied().collect(),
            missing: self.store.missing().iter().copied().collect(),
        });
    }

    fn snapshot(&self, wanted: &BTreeSet<ModelKey>) -> CacheSnapshot {
        CacheSnapshot {
            epoch: self.epoch,
            models: self.store.models_for(wanted),
            pending: self.store.pending().intersection(wanted).copied().collect(),
            missing: self.store.missing().intersection(wanted).copied().collect(),
            fetch_in_flight: self.in_flight.is_some(),
        }
    }

    fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            epoch: self.epoch,
            resolved: self.store.resolved_count(),
            pending: self.store.pending().len(),
            missing: self.store.missing().len(),
            ..self.stats
        }
    }
}

fn reply_with(
    reply: Option<oneshot::Sender<CacheResult<CacheSnapshot>>>,
    result: CacheResult<CacheSnapshot>,
) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

/// Async client for the ModelCacheService
#[derive(Clone)]
pub struct ModelCacheClient {
    command_tx: mpsc::UnboundedSender<CacheCommand>,
}

impl ModelCacheClient {
    pub fn new(handle: &ServiceHandle<CacheCommand>) -> Self {
        Self {
            command_tx: handle.command_tx.clone(),
        }
    }

    /// Reconcile a wanted key set
    ///
    /// Resolves once the keys are settled or a fetch for them completed; a
    /// call made while another fetch is running resolves immediately with the
    /// current state.
    pub async fn reconcile(
        &self,
        wanted: impl IntoIterator<Item = ModelKey>,
    ) -> CacheResult<CacheSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(CacheCommand::Reconcile {
                wanted: wanted.into_iter().collect(),
                reply: tx,
            })
            .map_err(|_| CacheError::ServiceUnavailable)?;
        rx.await.map_err(|_| CacheError::ServiceUnavailable)?
    }

    /// Reset polling state; returns the new epoch
    pub async fn reset(&self) -> CacheResult<u64> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(CacheCommand::Reset { reply: tx })
            .map_err(|_| CacheError::ServiceUnavailable)?;
        rx.await.map_err(|_| CacheError::ServiceUnavailable)
    }

    pub async fn stats(&self) -> CacheResult<CoalescerStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(CacheCommand::Stats { reply: tx })
            .map_err(|_| CacheError::ServiceUnavailable)?;
        rx.await.map_err(|_| CacheError::ServiceUnavailable)
    }

    pub fn shutdown(&self) -> CacheResult<()> {
        self.command_tx
            .send(CacheCommand::Shutdown)
            .map_err(|_| CacheError::ServiceUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpectrumModel;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const A: ModelKey = ModelKey {
        entity_id: 1,
        condition_id: 1,
    };
    const B: ModelKey = ModelKey {
        entity_id: 2,
        condition_id: 1,
    };
    const C: ModelKey = ModelKey {
        entity_id: 3,
        condition_id: 1,
    };

    /// Scriptable provider that records every call
    #[derive(Default)]
    struct FakeProvider {
        available: Mutex<HashSet<ModelKey>>,
        missing: Mutex<HashSet<ModelKey>>,
        calls: Mutex<Vec<Vec<ModelKey>>>,
        fail: AtomicBool,
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeProvider {
        fn with(available: &[ModelKey]) -> Self {
            Self {
                available: Mutex::new(available.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn gated(mut self) -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            self.gate = Some(Arc::clone(&gate));
            (self, gate)
        }

        fn make_available(&self, key: ModelKey) {
            self.available.lock().unwrap().insert(key);
        }

        fn calls(&self) -> Vec<Vec<ModelKey>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ModelProvider for FakeProvider {
        async fn fetch_models(&self, keys: Vec<ModelKey>) -> Result<ModelBatch, FetchError> {
            self.calls.lock().unwrap().push(keys.clone());
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Unavailable("connection refused".into()));
            }

            let available = self.available.lock().unwrap().clone();
            let missing = self.missing.lock().unwrap().clone();
            let mut batch = ModelBatch::default();
            for key in keys {
                if available.contains(&key) {
                    batch.models.push((key, Arc::new(SpectrumModel::default())));
                } else if missing.contains(&key) {
                    batch.missing.push(key);
                }
            }
            Ok(batch)
        }
    }

    fn start(provider: Arc<FakeProvider>) -> (ModelCacheClient, EventBus) {
        let bus = EventBus::default();
        let handle = ModelCacheService::spawn(provider, CacheConfig::default(), bus.clone());
        (ModelCacheClient::new(&handle), bus)
    }

    async fn wait_for_calls(provider: &FakeProvider, n: usize) {
        while provider.calls().len() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_only_uncached_keys() {
        let provider = Arc::new(FakeProvider::with(&[A, B]));
        let (client, _bus) = start(Arc::clone(&provider));

        let first = client.reconcile([A]).await.unwrap();
        assert!(first.model(&A).is_some());

        let second = client.reconcile([A, B]).await.unwrap();
        assert_eq!(second.models.len(), 2);

        client.reconcile([A, B]).await.unwrap();
        assert_eq!(provider.calls(), vec![vec![A], vec![B]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_with_one_follow_up() {
        let (provider, gate) = FakeProvider::with(&[A, B]).gated();
        let provider = Arc::new(provider);
        let (client, _bus) = start(Arc::clone(&provider));

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.reconcile([A]).await })
        };
        wait_for_calls(&provider, 1).await;

        // Arrives mid-fetch: answered immediately, no second fetch yet
        let second = client.reconcile([A, B]).await.unwrap();
        assert!(second.fetch_in_flight);
        let third = client.reconcile([A, B]).await.unwrap();
        assert!(third.models.is_empty());
        assert_eq!(provider.calls().len(), 1);

        gate.add_permits(8);
        let first = first.await.unwrap().unwrap();
        assert!(first.model(&A).is_some());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(provider.calls(), vec![vec![A], vec![B]]);

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.reruns, 1);
        assert_eq!(stats.resolved, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_keys_are_polled_until_resolved() {
        let provider = Arc::new(FakeProvider::with(&[A]));
        let (client, bus) = start(Arc::clone(&provider));
        let events = bus.subscribe();

        let snapshot = client.reconcile([A, B]).await.unwrap();
        assert!(snapshot.model(&A).is_some());
        assert_eq!(snapshot.pending, [B].into_iter().collect());

        // Still pending before the poll: no extra fetch
        client.reconcile([A, B]).await.unwrap();
        assert_eq!(provider.calls().len(), 1);

        provider.make_available(B);
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        assert_eq!(provider.calls(), vec![vec![A, B], vec![B]]);
        let snapshot = client.reconcile([A, B]).await.unwrap();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.models.len(), 2);
        assert_eq!(client.stats().await.unwrap().retries, 1);

        let updated: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                SpectrumEvent::ModelsUpdated { keys, .. } => Some(keys),
                _ => None,
            })
            .collect();
        assert_eq!(updated, vec![vec![A], vec![B]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_retry() {
        let provider = Arc::new(FakeProvider::default());
        let (client, _bus) = start(Arc::clone(&provider));

        let snapshot = client.reconcile([A]).await.unwrap();
        assert_eq!(snapshot.pending.len(), 1);

        assert_eq!(client.reset().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(client.stats().await.unwrap().pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_leaving_view_stop_polling() {
        let provider = Arc::new(FakeProvider::with(&[A]));
        let (client, _bus) = start(Arc::clone(&provider));

        let snapshot = client.reconcile([B]).await.unwrap();
        assert_eq!(snapshot.pending, [B].into_iter().collect());

        // The view moves on to A while B is still being prepared
        let snapshot = client.reconcile([A]).await.unwrap();
        assert!(snapshot.model(&A).is_some());
        assert!(snapshot.pending.is_empty());

        tokio::time::sleep(Duration::from_secs(200)).await;
        let b_fetches = provider.calls().iter().filter(|call| call.contains(&B)).count();
        assert_eq!(b_fetches, 1);
        assert_eq!(provider.calls(), vec![vec![B], vec![A]]);
        let stats = client.stats().await.unwrap();
        assert_eq!((stats.pending, stats.retries), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_narrowed_view_polls_remaining_keys() {
        let provider = Arc::new(FakeProvider::default());
        let (client, _bus) = start(Arc::clone(&provider));

        let snapshot = client.reconcile([A, B]).await.unwrap();
        assert_eq!(snapshot.pending.len(), 2);

        client.reconcile([B]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(provider.calls(), vec![vec![A, B], vec![B]]);
        assert_eq!(client.stats().await.unwrap().pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_result_for_abandoned_key_is_not_kept_pending() {
        let (provider, gate) = FakeProvider::default().gated();
        let provider = Arc::new(provider);
        let (client, _bus) = start(Arc::clone(&provider));

        gate.add_permits(1);
        client.reconcile([B]).await.unwrap();

        // The poll for B is in flight when the view switches to C
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        wait_for_calls(&provider, 2).await;
        provider.missing.lock().unwrap().insert(C);
        client.reconcile([C]).await.unwrap();
        gate.add_permits(8);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.calls(), vec![vec![B], vec![B], vec![C]]);
        let stats = client.stats().await.unwrap();
        assert_eq!((stats.pending, stats.missing), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_response_mutates_nothing() {
        let (provider, gate) = FakeProvider::with(&[A]).gated();
        let provider = Arc::new(provider);
        let (client, _bus) = start(Arc::clone(&provider));

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.reconcile([A]).await })
        };
        wait_for_calls(&provider, 1).await;
        client.reset().await.unwrap();
        gate.add_permits(8);

        match first.await.unwrap() {
            Err(CacheError::Superseded { epoch }) => assert_eq!(epoch, 1),
            other => panic!("expected Superseded, got {:?}", other.map(|s| s.epoch)),
        }
        let stats = client.stats().await.unwrap();
        assert_eq!(stats.stale_responses, 1);
        assert_eq!(stats.resolved, 0);

        // Nothing was cached, so the next call fetches again
        let snapshot = client.reconcile([A]).await.unwrap();
        assert!(snapshot.model(&A).is_some());
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_keys_are_never_retried() {
        let provider = Arc::new(FakeProvider::default());
        provider.missing.lock().unwrap().insert(C);
        let (client, _bus) = start(Arc::clone(&provider));

        let snapshot = client.reconcile([C]).await.unwrap();
        assert_eq!(snapshot.missing, [C].into_iter().collect());
        assert!(snapshot.pending.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        client.reconcile([C]).await.unwrap();
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_reaches_caller_and_leaves_state() {
        let provider = Arc::new(FakeProvider::with(&[A]));
        provider.fail.store(true, Ordering::SeqCst);
        let (client, bus) = start(Arc::clone(&provider));
        let events = bus.subscribe();

        let err = client.reconcile([A]).await.unwrap_err();
        assert!(matches!(err, CacheError::Fetch(FetchError::Unavailable(_))));

        let stats = client.stats().await.unwrap();
        assert_eq!((stats.resolved, stats.pending, stats.missing), (0, 0, 0));
        assert!(events
            .try_iter()
            .any(|e| matches!(e, SpectrumEvent::FetchFailed { .. })));

        provider.fail.store(false, Ordering::SeqCst);
        let snapshot = client.reconcile([A]).await.unwrap();
        assert!(snapshot.model(&A).is_some());
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_backs_off() {
        let provider = Arc::new(FakeProvider::default());
        let (client, _bus) = start(Arc::clone(&provider));

        client.reconcile([A]).await.unwrap();
        provider.fail.store(true, Ordering::SeqCst);

        // First poll at 10 s fails; the next one waits 20 s
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(provider.calls().len(), 2);
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(provider.calls().len(), 2);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let provider = Arc::new(FakeProvider::default());
        let bus = EventBus::default();
        let events = bus.subscribe();
        let handle = ModelCacheService::spawn(provider, CacheConfig::default(), bus);
        let client = ModelCacheClient::new(&handle);

        client.shutdown().unwrap();
        handle.join().await;
        assert!(matches!(
            client.reconcile([A]).await,
            Err(CacheError::ServiceUnavailable)
        ));
        assert!(events
            .try_iter()
            .any(|e| matches!(e, SpectrumEvent::ServiceStopped { .. })));
    }
}
