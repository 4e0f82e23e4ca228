//! Bounded fetch queue drained by a fixed pool of workers.
//!
//! Each worker runs the resolver chain for one request at a time. In-flight
//! requests are tracked by instance id so they can be cancelled; the entry is
//! removed on every exit path by [`InFlight`]'s `Drop`.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use hashbrown::HashMap;
use romshelf_shared::{FetchRequest, MetadataStatus, MetadataStatusUpdate, ResolvedMetadata};
use smallvec::SmallVec;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Resolver;
use crate::config::FetcherConfig;
use crate::events::EventSink;
use crate::sync::{lock, read, write};

/// Receives `(request, metadata, resolver name)` for every successful resolution.
pub type FetchCallback = Arc<dyn Fn(&FetchRequest, ResolvedMetadata, &str) + Send + Sync>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    #[error("metadata fetcher is not running")]
    NotRunning,
    #[error("metadata fetch queue is full")]
    QueueFull,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<FetchRequest>>>;

struct CancelEntry {
    generation: u64,
    token: CancellationToken,
}

/// Running flag and cancellation registry share one lock.
#[derive(Default)]
struct PoolState {
    running: bool,
    tx: Option<mpsc::Sender<FetchRequest>>,
    root: CancellationToken,
    in_flight: HashMap<String, CancelEntry>,
    next_generation: u64,
    workers: Vec<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<PoolState>,
    resolvers: RwLock<Vec<Arc<dyn Resolver>>>,
    sink: Arc<dyn EventSink>,
    callback: FetchCallback,
}

pub struct Fetcher {
    shared: Arc<Shared>,
    workers: usize,
    capacity: usize,
    enqueue_timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig, sink: Arc<dyn EventSink>, callback: FetchCallback) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState::default()),
                resolvers: RwLock::new(Vec::new()),
                sink,
                callback,
            }),
            workers: config.workers.max(1),
            capacity: config.queue_capacity.max(1),
            enqueue_timeout: config.enqueue_timeout(),
        }
    }

    /// Append a resolver to the chain. Call before [`Fetcher::start`].
    pub fn register_resolver(&self, resolver: Arc<dyn Resolver>) {
        tracing::info!("Registered metadata resolver: {}", resolver.name());
        write(&self.shared.resolvers).push(resolver);
    }

    /// Spawn the worker pool. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut state = lock(&self.shared.state);
        if state.running {
            return;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let root = CancellationToken::new();

        state.workers = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&self.shared),
                    Arc::clone(&rx),
                    root.clone(),
                ))
            })
            .collect();
        state.tx = Some(tx);
        state.root = root;
        state.in_flight.clear();
        state.running = true;

        tracing::info!(
            "Metadata fetcher started ({} workers, capacity {})",
            self.workers,
            self.capacity
        );
    }

    /// Cancel every in-flight fetch, close the queue and wait for all workers.
    ///
    /// Requests still queued are drained and reported as cancelled. Calling
    /// `stop` on a stopped fetcher returns immediately.
    pub async fn stop(&self) {
        let workers = {
            let mut state = lock(&self.shared.state);
            if !state.running {
                return;
            }
            state.running = false;
            state.root.cancel();
            state.in_flight.clear();
            state.tx = None;
            std::mem::take(&mut state.workers)
        };

        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!("Metadata worker ended abnormally: {}", e);
            }
        }
        tracing::info!("Metadata fetcher stopped");
    }

    /// Enqueue a request, waiting up to the configured timeout for space.
    pub async fn queue(&self, request: FetchRequest) -> Result<(), FetchError> {
        let tx = {
            let state = lock(&self.shared.state);
            match &state.tx {
                Some(tx) if state.running => tx.clone(),
                _ => return Err(FetchError::NotRunning),
            }
        };

        let instance_id = request.instance_id.clone();
        match tx.send_timeout(request, self.enqueue_timeout).await {
            Ok(()) => {
                tracing::debug!(instance_id = %instance_id, "Queued metadata fetch");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(instance_id = %instance_id, "Metadata fetch queue full");
                Err(FetchError::QueueFull)
            }
            Err(SendTimeoutError::Closed(_)) => Err(FetchError::NotRunning),
        }
    }

    /// Cancel the in-flight fetch for an instance.
    ///
    /// Returns `false` (and does nothing) if no fetch was in flight.
    pub fn cancel(&self, instance_id: &str) -> bool {
        let entry = lock(&self.shared.state).in_flight.remove(instance_id);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                tracing::info!(instance_id = %instance_id, "Cancelled metadata fetch");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    /// Number of requests currently inside the resolver chain.
    pub fn in_flight(&self) -> usize {
        lock(&self.shared.state).in_flight.len()
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        let mut state = lock(&self.shared.state);
        if state.running {
            state.running = false;
            state.root.cancel();
            state.in_flight.clear();
            state.tx = None;
        }
    }
}

async fn worker_loop(
    id: usize,
    shared: Arc<Shared>,
    rx: SharedReceiver,
    root: CancellationToken,
) {
    tracing::debug!("Metadata worker {} started", id);
    loop {
        let next = rx.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };
        if root.is_cancelled() {
            shared.report_cancelled(&request);
            continue;
        }
        shared.process(&root, request).await;
    }
    tracing::debug!("Metadata worker {} exited", id);
}

/// Registry entry for one in-flight request. Dropping it releases the entry
/// unless a newer request for the same instance has replaced it.
struct InFlight<'a> {
    shared: &'a Shared,
    instance_id: String,
    generation: u64,
    token: CancellationToken,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.shared.state);
        if state
            .in_flight
            .get(&self.instance_id)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            state.in_flight.remove(&self.instance_id);
        }
    }
}

impl Shared {
    fn register(&self, root: &CancellationToken, instance_id: &str) -> InFlight<'_> {
        let token = root.child_token();
        let mut state = lock(&self.state);
        state.next_generation += 1;
        let generation = state.next_generation;
        let previous = state.in_flight.insert(
            instance_id.to_string(),
            CancelEntry {
                generation,
                token: token.clone(),
            },
        );
        // One live handle per instance: the newer request wins
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        InFlight {
            shared: self,
            instance_id: instance_id.to_string(),
            generation,
            token,
        }
    }

    async fn process(&self, root: &CancellationToken, request: FetchRequest) {
        let guard = self.register(root, &request.instance_id);
        let resolvers: Vec<Arc<dyn Resolver>> = read(&self.resolvers).clone();
        let mut tried: SmallVec<[String; 4]> = SmallVec::new();

        for resolver in resolvers {
            if guard.token.is_cancelled() {
                self.on_cancelled(root, &request);
                return;
            }
            if !resolver.supports(&request.source, &request.platform) {
                continue;
            }
            tried.push(resolver.name().to_string());

            let outcome = tokio::select! {
                biased;
                _ = guard.token.cancelled() => None,
                result = resolver.resolve(&request) => Some(result),
            };

            match outcome {
                None => {
                    self.on_cancelled(root, &request);
                    return;
                }
                Some(Ok(metadata)) => {
                    tracing::info!(
                        instance_id = %request.instance_id,
                        "Resolved metadata via {}",
                        resolver.name()
                    );
                    drop(guard);
                    (self.callback)(&request, metadata, resolver.name());
                    return;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        instance_id = %request.instance_id,
                        "Resolver {} failed: {:#}",
                        resolver.name(),
                        e
                    );
                }
            }
        }

        if guard.token.is_cancelled() {
            self.on_cancelled(root, &request);
            return;
        }

        tracing::warn!(
            instance_id = %request.instance_id,
            "No metadata resolver succeeded for '{}' (tried: {})",
            request.name,
            tried.join(", ")
        );
        self.sink.metadata_status_changed(MetadataStatusUpdate {
            instance_id: request.instance_id.clone(),
            game_id: request.game_id.clone(),
            status: MetadataStatus::exhausted(tried.into_vec()),
        });
    }

    /// Shutdown cancellations are reported; explicit cancels are the caller's to report.
    fn on_cancelled(&self, root: &CancellationToken, request: &FetchRequest) {
        if root.is_cancelled() {
            self.report_cancelled(request);
        } else {
            tracing::debug!(instance_id = %request.instance_id, "Metadata fetch cancelled");
        }
    }

    fn report_cancelled(&self, request: &FetchRequest) {
        self.sink.metadata_status_changed(MetadataStatusUpdate {
            instance_id: request.instance_id.clone(),
            game_id: request.game_id.clone(),
            status: MetadataStatus::cancelled(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::test_utils::{RecordingSink, ScriptedResolver, fetch_request, wait_until};
    use romshelf_shared::MetadataState;
    use tokio::task::JoinSet;

    fn recording_callback() -> (FetchCallback, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: FetchCallback = Arc::new(move |req, _metadata, resolver| {
            let _ = tx.send((req.instance_id.clone(), resolver.to_string()));
        });
        (callback, rx)
    }

    fn metadata_states(sink: &RecordingSink, instance_id: &str) -> Vec<MetadataState> {
        sink.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Metadata(u) if u.instance_id == instance_id => Some(u.status.state),
                _ => None,
            })
            .collect()
    }

    // =============================================================
    // Lifecycle
    // =============================================================

    #[tokio::test]
    async fn test_queue_requires_running() {
        let (callback, _rx) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);

        assert_eq!(
            fetcher.queue(fetch_request("file_1")).await,
            Err(FetchError::NotRunning)
        );

        fetcher.start();
        assert!(fetcher.is_running());
        fetcher.stop().await;

        assert_eq!(
            fetcher.queue(fetch_request("file_1")).await,
            Err(FetchError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_stop_twice_is_harmless() {
        let (callback, _rx) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);
        fetcher.start();
        fetcher.stop().await;
        fetcher.stop().await;
        assert!(!fetcher.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_stop_accepts_requests() {
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);
        fetcher.register_resolver(ScriptedResolver::succeeding("a", "Zelda"));

        fetcher.start();
        fetcher.stop().await;
        fetcher.start();
        fetcher.queue(fetch_request("file_1")).await.unwrap();
        assert_eq!(resolved.recv().await.unwrap().0, "file_1");
        fetcher.stop().await;
    }

    // =============================================================
    // Resolver chain
    // =============================================================

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);
        let a = ScriptedResolver::succeeding("a", "Zelda");
        let b = ScriptedResolver::succeeding("b", "Other");
        fetcher.register_resolver(a.clone());
        fetcher.register_resolver(b.clone());
        fetcher.start();

        fetcher.queue(fetch_request("file_1")).await.unwrap();
        let (instance, resolver) = resolved.recv().await.unwrap();
        fetcher.stop().await;

        assert_eq!(instance, "file_1");
        assert_eq!(resolver, "a");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_falls_through_and_unsupported_is_skipped() {
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);
        let failing = ScriptedResolver::failing("broken");
        let skipped = ScriptedResolver::unsupported("other-source");
        let good = ScriptedResolver::succeeding("good", "Zelda");
        fetcher.register_resolver(failing.clone());
        fetcher.register_resolver(skipped.clone());
        fetcher.register_resolver(good.clone());
        fetcher.start();

        fetcher.queue(fetch_request("file_1")).await.unwrap();
        assert_eq!(resolved.recv().await.unwrap().1, "good");
        fetcher.stop().await;

        assert_eq!(failing.calls(), 1);
        assert_eq!(skipped.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_sources_tried() {
        let sink = RecordingSink::new();
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), sink.clone(), callback);
        fetcher.register_resolver(ScriptedResolver::failing("a"));
        fetcher.register_resolver(ScriptedResolver::unsupported("b"));
        fetcher.register_resolver(ScriptedResolver::failing("c"));
        fetcher.start();

        fetcher.queue(fetch_request("file_1")).await.unwrap();
        wait_until(|| !metadata_states(&sink, "file_1").is_empty()).await;
        fetcher.stop().await;

        let Some(Event::Metadata(update)) = sink.events().into_iter().next() else {
            panic!("expected a metadata event");
        };
        assert_eq!(update.status.state, MetadataState::Error);
        assert_eq!(update.status.sources_tried, vec!["a", "c"]);
        assert!(resolved.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_every_request_resolved_exactly_once() {
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);
        let resolver = ScriptedResolver::succeeding("a", "Zelda");
        fetcher.register_resolver(resolver.clone());
        fetcher.start();

        for i in 0..10 {
            fetcher
                .queue(fetch_request(&format!("file_{i}")))
                .await
                .unwrap();
        }
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(resolved.recv().await.unwrap().0);
        }
        fetcher.stop().await;

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 10);
        assert_eq!(resolver.calls(), 10);
        assert!(resolved.try_recv().is_err());
    }

    // =============================================================
    // Cancellation
    // =============================================================

    #[tokio::test]
    async fn test_cancel_without_fetch_is_noop() {
        let (callback, _rx) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), RecordingSink::new(), callback);
        assert!(!fetcher.cancel("file_unknown"));
        fetcher.start();
        assert!(!fetcher.cancel("file_unknown"));
        assert!(fetcher.is_running());
        fetcher.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_chain_silently() {
        let sink = RecordingSink::new();
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), sink.clone(), callback);
        let after = ScriptedResolver::succeeding("after", "Zelda");
        fetcher.register_resolver(ScriptedResolver::hanging("slow"));
        fetcher.register_resolver(after.clone());
        fetcher.start();

        fetcher.queue(fetch_request("file_1")).await.unwrap();
        wait_until(|| fetcher.in_flight() == 1).await;

        assert!(fetcher.cancel("file_1"));
        assert!(!fetcher.cancel("file_1"));
        wait_until(|| fetcher.in_flight() == 0).await;
        fetcher.stop().await;

        assert_eq!(after.calls(), 0);
        assert!(resolved.try_recv().is_err());
        assert!(metadata_states(&sink, "file_1").is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_and_reports() {
        let sink = RecordingSink::new();
        let (callback, _rx) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), sink.clone(), callback);
        fetcher.register_resolver(ScriptedResolver::hanging("slow"));
        fetcher.start();

        fetcher.queue(fetch_request("file_1")).await.unwrap();
        wait_until(|| fetcher.in_flight() == 1).await;
        fetcher.stop().await;

        assert_eq!(fetcher.in_flight(), 0);
        assert_eq!(
            metadata_states(&sink, "file_1"),
            vec![MetadataState::Cancelled]
        );
    }

    #[tokio::test]
    async fn test_cancel_is_per_instance_and_requeue_gets_fresh_handle() {
        let sink = RecordingSink::new();
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), sink.clone(), callback);
        let slow = ScriptedResolver::hanging("slow");
        fetcher.register_resolver(slow.clone());
        fetcher.start();

        fetcher.queue(fetch_request("file_a")).await.unwrap();
        fetcher.queue(fetch_request("file_b")).await.unwrap();
        wait_until(|| slow.calls() == 2).await;
        assert_eq!(fetcher.in_flight(), 2);

        assert!(fetcher.cancel("file_a"));
        assert_eq!(fetcher.in_flight(), 1);

        // b keeps its handle; a's is gone until requeued
        assert!(!fetcher.cancel("file_a"));
        fetcher.queue(fetch_request("file_a")).await.unwrap();
        wait_until(|| slow.calls() == 3).await;
        assert_eq!(fetcher.in_flight(), 2);

        assert!(fetcher.cancel("file_b"));
        assert_eq!(fetcher.in_flight(), 1);
        assert!(fetcher.cancel("file_a"));
        assert_eq!(fetcher.in_flight(), 0);

        fetcher.stop().await;
        assert!(resolved.try_recv().is_err());
        assert!(metadata_states(&sink, "file_a").is_empty());
        assert!(metadata_states(&sink, "file_b").is_empty());
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_older() {
        let sink = RecordingSink::new();
        let (callback, mut resolved) = recording_callback();
        let fetcher = Fetcher::new(&FetcherConfig::default(), sink.clone(), callback);
        let slow = ScriptedResolver::hanging("slow");
        fetcher.register_resolver(slow.clone());
        fetcher.start();

        fetcher.queue(fetch_request("file_1")).await.unwrap();
        fetcher.queue(fetch_request("file_1")).await.unwrap();
        wait_until(|| slow.calls() >= 1).await;

        // Give the superseded worker time to unwind and drop its guard
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(fetcher.in_flight(), 1);

        assert!(fetcher.cancel("file_1"));
        assert_eq!(fetcher.in_flight(), 0);
        assert!(!fetcher.cancel("file_1"));

        fetcher.stop().await;
        assert!(resolved.try_recv().is_err());
        assert!(metadata_states(&sink, "file_1").is_empty());
    }

    // =============================================================
    // Load shedding
    // =============================================================

    #[tokio::test(start_paused = true)]
    async fn test_overflow_returns_queue_full() {
        let (callback, _rx) = recording_callback();
        let config = FetcherConfig {
            workers: 2,
            queue_capacity: 100,
            enqueue_timeout_ms: 1000,
        };
        let fetcher = Arc::new(Fetcher::new(&config, RecordingSink::new(), callback));
        fetcher.register_resolver(ScriptedResolver::hanging("slow"));
        fetcher.start();

        let mut pushes = JoinSet::new();
        for i in 0..150 {
            let fetcher = Arc::clone(&fetcher);
            pushes.spawn(async move { fetcher.queue(fetch_request(&format!("file_{i}"))).await });
        }

        let (mut ok, mut full) = (0, 0);
        while let Some(result) = pushes.join_next().await {
            match result.unwrap() {
                Ok(()) => ok += 1,
                Err(FetchError::QueueFull) => full += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        fetcher.stop().await;

        assert!(ok >= 100, "only {ok} accepted");
        assert!(full > 0);
        assert_eq!(ok + full, 150);
    }
}
