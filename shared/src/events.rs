//! Notification payloads sent to the event sink.

use serde::{Deserialize, Serialize};

use crate::models::MetadataStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStatus {
    Launching,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchStatusUpdate {
    pub instance_id: String,
    pub game_id: String,
    pub status: LaunchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LaunchStatusUpdate {
    pub fn new(instance_id: &str, game_id: &str, status: LaunchStatus) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            game_id: game_id.to_string(),
            status,
            error: None,
        }
    }

    pub fn failed(instance_id: &str, game_id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(instance_id, game_id, LaunchStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataStatusUpdate {
    pub instance_id: String,
    pub game_id: String,
    pub status: MetadataStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityTarget {
    Emulator,
    Core,
}

/// An emulator or core whose probed availability differs from the stored flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityChange {
    pub target: AvailabilityTarget,
    pub id: String,
    pub available: bool,
}
