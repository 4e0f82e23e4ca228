//! Library records: games, instances, metadata status and fetch payloads.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source name for locally emulated ROMs.
pub const SOURCE_EMULATED: &str = "emulated";
/// Source name for the Steam storefront client.
pub const SOURCE_STEAM: &str = "steam";

/// The abstract game entity. Several instances may point at one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Art type (`cover`, `screenshot`, `logo`, ...) to remote URL
    #[serde(default)]
    pub art_urls: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    /// A game with only a name, created when a new instance is discovered.
    pub fn placeholder(id: impl Into<String>, name: impl Into<String>, platform: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            release_date: None,
            developer: String::new(),
            publisher: String::new(),
            genres: Vec::new(),
            platforms: vec![platform.to_string()],
            art_urls: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy every non-empty field of `metadata` onto this game.
    ///
    /// Empty strings and empty lists never overwrite existing values.
    pub fn apply_metadata(&mut self, metadata: &ResolvedMetadata) {
        let game = &metadata.game;
        if !game.name.is_empty() {
            self.name = game.name.clone();
        }
        if !game.description.is_empty() {
            self.description = game.description.clone();
        }
        if !game.developer.is_empty() {
            self.developer = game.developer.clone();
        }
        if !game.publisher.is_empty() {
            self.publisher = game.publisher.clone();
        }
        if game.release_date.is_some() {
            self.release_date = game.release_date;
        }
        if !game.genres.is_empty() {
            self.genres = game.genres.clone();
        }
        for (art_type, url) in &metadata.art_urls {
            self.art_urls.insert(art_type.clone(), url.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// One concrete copy of a game: a ROM file or a storefront installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInstance {
    pub id: String,
    pub game_id: String,
    /// Source name (`emulated`, `steam`, ...)
    pub source: String,
    pub platform: String,
    /// Identifier inside the source (content hash, app id)
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    pub installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    /// Name derived by the source, used until metadata is resolved
    pub display_name: String,
    /// Whether an emulator could run this instance at scan time.
    /// `None` for sources that don't need one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator_available: Option<bool>,
    #[serde(default)]
    pub metadata_status: MetadataStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameInstance {
    /// A fresh, installed instance with no file details filled in.
    pub fn new(
        id: impl Into<String>,
        game_id: impl Into<String>,
        source: &str,
        platform: &str,
        source_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            game_id: game_id.into(),
            source: source.to_string(),
            platform: platform.to_string(),
            source_id: source_id.into(),
            path: None,
            filename: String::new(),
            file_size: 0,
            file_hash: None,
            installed: true,
            install_path: None,
            display_name: display_name.into(),
            emulator_available: None,
            metadata_status: MetadataStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fields a rescan may legitimately change on an existing instance.
    ///
    /// Returns `true` if anything differed and was copied over.
    pub fn merge_scanned(&mut self, scanned: &GameInstance) -> bool {
        let mut changed = false;
        if self.install_path != scanned.install_path {
            self.install_path = scanned.install_path.clone();
            changed = true;
        }
        if self.path != scanned.path {
            self.path = scanned.path.clone();
            changed = true;
        }
        if self.file_size != scanned.file_size {
            self.file_size = scanned.file_size;
            changed = true;
        }
        if self.installed != scanned.installed {
            self.installed = scanned.installed;
            changed = true;
        }
        if scanned.emulator_available.is_some()
            && self.emulator_available != scanned.emulator_available
        {
            self.emulator_available = scanned.emulator_available;
            changed = true;
        }
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

/// State of the asynchronous metadata fetch for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataState {
    #[default]
    Idle,
    Fetching,
    Completed,
    Error,
    Cancelled,
}

/// Metadata fetch progress, persisted per instance and sent to the UI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataStatus {
    pub state: MetadataState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_tried: Vec<String>,
}

impl MetadataStatus {
    pub fn fetching(message: impl Into<String>) -> Self {
        Self {
            state: MetadataState::Fetching,
            message: Some(message.into()),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            state: MetadataState::Completed,
            message: Some(message.into()),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn exhausted(sources_tried: Vec<String>) -> Self {
        Self {
            state: MetadataState::Error,
            error: Some("no metadata resolver succeeded".to_string()),
            completed_at: Some(Utc::now()),
            sources_tried,
            ..Self::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            state: MetadataState::Cancelled,
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// The fetch never started, e.g. the queue rejected it.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: MetadataState::Error,
            error: Some(error.into()),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == MetadataState::Completed
    }
}

/// A request to resolve metadata for one instance. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub game_id: String,
    pub instance_id: String,
    pub priority: i32,
    pub platforms: Vec<String>,
    /// Display name used as the search term
    pub name: String,
    pub file_hash: Option<String>,
    pub source: String,
    pub platform: String,
}

impl FetchRequest {
    pub fn for_instance(instance: &GameInstance, priority: i32) -> Self {
        Self {
            game_id: instance.game_id.clone(),
            instance_id: instance.id.clone(),
            priority,
            platforms: vec![instance.platform.clone()],
            name: instance.display_name.clone(),
            file_hash: instance.file_hash.clone(),
            source: instance.source.clone(),
            platform: instance.platform.clone(),
        }
    }
}

/// Metadata produced by a resolver. Ownership passes to the fetch callback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub game: GameMetadata,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformMetadata>,
    #[serde(default)]
    pub art_urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformMetadata {
    pub platform: String,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
}
