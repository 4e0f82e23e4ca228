//! Event sink for status notifications.
//!
//! The pipeline never talks to a UI directly. It reports through an injected
//! [`EventSink`]; [`NoopSink`] stands in when nothing is listening.

use romshelf_shared::{AvailabilityChange, LaunchStatusUpdate, MetadataStatusUpdate};
use tokio::sync::mpsc;

/// Receiver of status notifications.
///
/// Implementations must not block: they are called from worker and monitor tasks.
pub trait EventSink: Send + Sync {
    fn metadata_status_changed(&self, update: MetadataStatusUpdate);

    fn launch_status_changed(&self, update: LaunchStatusUpdate);

    fn emulator_availability_changed(&self, _change: AvailabilityChange) {}
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn metadata_status_changed(&self, _update: MetadataStatusUpdate) {}
    fn launch_status_changed(&self, _update: LaunchStatusUpdate) {}
}

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn metadata_status_changed(&self, update: MetadataStatusUpdate) {
        tracing::info!(
            instance_id = %update.instance_id,
            state = ?update.status.state,
            "metadata status changed"
        );
    }

    fn launch_status_changed(&self, update: LaunchStatusUpdate) {
        match &update.error {
            Some(error) => tracing::warn!(
                instance_id = %update.instance_id,
                status = ?update.status,
                "launch status changed: {}",
                error
            ),
            None => tracing::info!(
                instance_id = %update.instance_id,
                status = ?update.status,
                "launch status changed"
            ),
        }
    }

    fn emulator_availability_changed(&self, change: AvailabilityChange) {
        tracing::info!(
            target_kind = ?change.target,
            id = %change.id,
            available = change.available,
            "emulator availability changed"
        );
    }
}

/// Any notification, for consumers that want a single stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Metadata(MetadataStatusUpdate),
    Launch(LaunchStatusUpdate),
    Availability(AvailabilityChange),
}

/// Forwards events into an unbounded channel. Sends after the receiver is
/// dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn metadata_status_changed(&self, update: MetadataStatusUpdate) {
        let _ = self.tx.send(Event::Metadata(update));
    }

    fn launch_status_changed(&self, update: LaunchStatusUpdate) {
        let _ = self.tx.send(Event::Launch(update));
    }

    fn emulator_availability_changed(&self, change: AvailabilityChange) {
        let _ = self.tx.send(Event::Availability(change));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use romshelf_shared::{LaunchStatus, MetadataStatus};

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.launch_status_changed(LaunchStatusUpdate::new("i", "g", LaunchStatus::Launching));
        sink.metadata_status_changed(MetadataStatusUpdate {
            instance_id: "i".to_string(),
            game_id: "g".to_string(),
            status: MetadataStatus::cancelled(),
        });

        assert!(matches!(rx.try_recv(), Ok(Event::Launch(u)) if u.status == LaunchStatus::Launching));
        assert!(matches!(rx.try_recv(), Ok(Event::Metadata(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.launch_status_changed(LaunchStatusUpdate::new("i", "g", LaunchStatus::Stopped));
    }
}
