use crate::stats::OccupancySnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

pub const SLOT_UPDATES: &str = "slot_updates";
pub const STATS_UPDATE: &str = "stats-update";
pub const SUBSCRIBED: &str = "subscribed";

/// A named message pushed to real-time clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub event: String,
    pub data: Value,
}

impl PushEvent {
    pub fn new<S: Into<String>>(event: S, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn slot_updates(snapshot: &OccupancySnapshot) -> Self {
        Self::new(SLOT_UPDATES, snapshot_value(snapshot))
    }

    pub fn stats_update(snapshot: &OccupancySnapshot) -> Self {
        Self::new(STATS_UPDATE, snapshot_value(snapshot))
    }

    pub fn subscribed(channel: Value) -> Self {
        Self::new(SUBSCRIBED, serde_json::json!({ "channel": channel }))
    }
}

fn snapshot_value(snapshot: &OccupancySnapshot) -> Value {
    serde_json::to_value(snapshot).unwrap_or(Value::Null)
}

/// Receives every snapshot the sampler commits
pub trait NotificationSink: Send + Sync {
    /// Best-effort delivery; never retried
    fn publish(&self, snapshot: &OccupancySnapshot);
}

/// Broadcast bus fanning snapshots out to connected push clients
pub struct NotificationBus {
    sender: broadcast::Sender<PushEvent>,
}

impl NotificationBus {
    /// Create a new bus; slow clients lag past `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send(&self, event: PushEvent) {
        let name = event.event.clone();
        match self.sender.send(event) {
            Ok(receivers) => trace!("Pushed {} to {} clients", name, receivers),
            Err(_) => trace!("No clients connected for {}", name),
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(16)
    }
}

impl NotificationSink for NotificationBus {
    fn publish(&self, snapshot: &OccupancySnapshot) {
        debug!(
            "Publishing occupancy {}/{} ({:.1}%) to {} clients",
            snapshot.occupied_slots,
            snapshot.total_slots,
            snapshot.occupancy_rate,
            self.subscriber_count()
        );

        self.send(PushEvent::slot_updates(snapshot));
        self.send(PushEvent::stats_update(snapshot));
    }
}

/// Sink that remembers what it was given, for tests
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<OccupancySnapshot>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<OccupancySnapshot> {
        self.published.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, snapshot: &OccupancySnapshot) {
        self.published.lock().push(*snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_pushes_both_event_names() {
        let bus = NotificationBus::new(8);
        let mut receiver = bus.subscribe();
        let snapshot = OccupancySnapshot::from_counts(3, 1).unwrap();

        bus.publish(&snapshot);

        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.event, SLOT_UPDATES);
        assert_eq!(second.event, STATS_UPDATE);
        assert_eq!(first.data["occupiedSlots"], 3);
        assert_eq!(second.data, first.data);
    }

    #[test]
    fn test_bus_publish_without_clients_is_harmless() {
        let bus = NotificationBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&OccupancySnapshot::default());
    }

    #[test]
    fn test_push_event_wire_format() {
        let event = PushEvent::subscribed(Value::from("parking"));
        let json = serde_json::to_string(&event).unwrap();

        assert_eq!(json, r#"{"event":"subscribed","data":{"channel":"parking"}}"#);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.publish(&OccupancySnapshot::default());
        assert_eq!(sink.published(), vec![OccupancySnapshot::default()]);
    }
}
