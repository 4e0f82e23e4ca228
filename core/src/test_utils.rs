//! Shared fakes and fixtures for unit tests

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use romshelf_shared::{
    AvailabilityChange, FetchRequest, GameInstance, GameMetadata, LaunchStatusUpdate,
    MetadataStatusUpdate, ResolvedMetadata,
};
use tempfile::TempDir;

use crate::config::EmulatorsConfig;
use crate::emulator::{EmulatorEngine, HostProbe};
use crate::events::{Event, EventSink};
use crate::launch::{GameSource, LaunchError, LaunchedProcess, MonitorStrategy, ProcessProbe};
use crate::metadata::Resolver;
use crate::store::MemoryStore;

// ============================================================================
// Events
// ============================================================================

/// Sink that keeps every event in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn metadata_status_changed(&self, update: MetadataStatusUpdate) {
        self.events.lock().unwrap().push(Event::Metadata(update));
    }

    fn launch_status_changed(&self, update: LaunchStatusUpdate) {
        self.events.lock().unwrap().push(Event::Launch(update));
    }

    fn emulator_availability_changed(&self, change: AvailabilityChange) {
        self.events.lock().unwrap().push(Event::Availability(change));
    }
}

/// Poll `condition` until it holds. Panics after about five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

// ============================================================================
// Metadata
// ============================================================================

enum Behavior {
    Succeed(String),
    Fail,
    Hang,
}

/// Resolver with a fixed outcome that counts its calls.
pub struct ScriptedResolver {
    name: String,
    behavior: Behavior,
    supported: bool,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    fn build(name: &str, behavior: Behavior, supported: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            supported,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(name: &str, game_name: &str) -> Arc<Self> {
        Self::build(name, Behavior::Succeed(game_name.to_string()), true)
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::build(name, Behavior::Fail, true)
    }

    pub fn hanging(name: &str) -> Arc<Self> {
        Self::build(name, Behavior::Hang, true)
    }

    pub fn unsupported(name: &str) -> Arc<Self> {
        Self::build(name, Behavior::Succeed("unsupported".to_string()), false)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _source: &str, _platform: &str) -> bool {
        self.supported
    }

    async fn resolve(&self, _request: &FetchRequest) -> anyhow::Result<ResolvedMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed(game_name) => Ok(ResolvedMetadata {
                game: GameMetadata {
                    name: game_name.clone(),
                    ..Default::default()
                },
                ..Default::default()
            }),
            Behavior::Fail => anyhow::bail!("{} is down", self.name),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

pub fn fetch_request(instance_id: &str) -> FetchRequest {
    FetchRequest::for_instance(&instance(instance_id, "emulated"), 1)
}

/// An installed `nes` instance of `game_<id>`.
pub fn instance(id: &str, source: &str) -> GameInstance {
    GameInstance::new(id, format!("game_{id}"), source, "nes", id, id)
}

// ============================================================================
// Emulator engine
// ============================================================================

/// Host probe backed by in-memory sets; `file_exists` checks the real disk.
#[derive(Default)]
pub struct FakeProbe {
    flatpaks: Mutex<HashSet<String>>,
    executables: Mutex<HashSet<String>>,
}

impl FakeProbe {
    pub fn install_flatpak(&self, id: &str) {
        self.flatpaks.lock().unwrap().insert(id.to_string());
    }

    pub fn uninstall_flatpak(&self, id: &str) {
        self.flatpaks.lock().unwrap().remove(id);
    }

    pub fn add_executable(&self, name: &str) {
        self.executables.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl HostProbe for FakeProbe {
    async fn flatpak_installed(&self, flatpak_id: &str) -> bool {
        self.flatpaks.lock().unwrap().contains(flatpak_id)
    }

    fn executable_on_path(&self, name: &str) -> bool {
        self.executables.lock().unwrap().contains(name)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

pub struct EngineFixture {
    pub engine: EmulatorEngine,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub probe: Arc<FakeProbe>,
    pub dir: TempDir,
}

impl EngineFixture {
    pub fn cores_dir(&self) -> PathBuf {
        self.dir.path().join("cores")
    }

    pub fn install_core(&self, core_id: &str) {
        let dir = self.cores_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{core_id}.so")), b"core").unwrap();
    }
}

pub fn engine_fixture() -> EngineFixture {
    engine_fixture_with(|_| {})
}

/// Like [`engine_fixture`], with a chance to adjust the emulator config.
pub fn engine_fixture_with(configure: impl FnOnce(&mut EmulatorsConfig)) -> EngineFixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let sink = RecordingSink::new();
    let probe = Arc::new(FakeProbe::default());
    let mut config = EmulatorsConfig {
        flagship_id: "retroarch".to_string(),
        cores_dir: dir.path().join("cores"),
        ..Default::default()
    };
    configure(&mut config);
    let engine = EmulatorEngine::new(&config, store.clone(), sink.clone(), probe.clone());
    EngineFixture {
        engine,
        store,
        sink,
        probe,
        dir,
    }
}

// ============================================================================
// Launching
// ============================================================================

/// Process probe that answers from a script, one entry per poll.
pub struct ScriptedProbe {
    alive_for: Option<usize>,
    pattern: Vec<bool>,
    polls: AtomicUsize,
}

impl ScriptedProbe {
    /// Running for the first `polls` polls, gone afterwards.
    pub fn alive_for(polls: usize) -> Arc<Self> {
        Arc::new(Self {
            alive_for: Some(polls),
            pattern: Vec::new(),
            polls: AtomicUsize::new(0),
        })
    }

    /// Follow `pattern`, then report nothing running.
    pub fn from_pattern(pattern: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            alive_for: None,
            pattern: pattern.to_vec(),
            polls: AtomicUsize::new(0),
        })
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessProbe for ScriptedProbe {
    async fn running_under(&self, _install_path: &Path) -> bool {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        match self.alive_for {
            Some(n) => poll < n,
            None => self.pattern.get(poll).copied().unwrap_or(false),
        }
    }
}

/// Source that never spawns anything.
pub struct StubSource {
    name: String,
    error: Option<String>,
    strategy: MonitorStrategy,
}

impl StubSource {
    pub fn detached(name: &str, strategy: MonitorStrategy) -> Self {
        Self {
            name: name.to_string(),
            error: None,
            strategy,
        }
    }

    pub fn failing(name: &str, error: &str) -> Self {
        Self {
            name: name.to_string(),
            error: Some(error.to_string()),
            strategy: MonitorStrategy::DirectWait,
        }
    }
}

#[async_trait]
impl GameSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self) -> anyhow::Result<Vec<GameInstance>> {
        Ok(Vec::new())
    }

    async fn launch(&self, _instance: &GameInstance) -> Result<LaunchedProcess, LaunchError> {
        match &self.error {
            Some(error) => Err(anyhow::anyhow!("{error}").into()),
            None => Ok(LaunchedProcess::Detached),
        }
    }

    fn monitor_strategy(&self, _instance: &GameInstance) -> MonitorStrategy {
        self.strategy.clone()
    }
}
