//! Event sinks.
//!
//! The orchestrator receives a `&dyn EventSink` per call instead of reaching
//! for a global emitter. Emission is fire-and-forget: a sink must never block
//! or fail the pipeline.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{MessageType, ProgressEvent};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Destination for progress events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Logs events at debug level.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        debug!(
            subject_id = %event.subject_id,
            phase = %event.phase,
            message_type = %event.message_type,
            round = ?event.metadata.round,
            "{}",
            event.content
        );
    }
}

/// Shared reference to a BroadcastSink
pub type SharedBroadcastSink = Arc<BroadcastSink>;

/// Pub/sub sink backed by a Tokio broadcast channel.
///
/// Slow subscribers lag and lose events rather than slowing the committee.
pub struct BroadcastSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedBroadcastSink {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: ProgressEvent) {
        let message_type = event.message_type;
        // No receivers is fine.
        match self.sender.send(event) {
            Ok(count) => debug!(%message_type, receivers = count, "Event published"),
            Err(_) => debug!(%message_type, "Event published (no receivers)"),
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_of(&self, message_type: MessageType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.message_type == message_type)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Selective view over events, by subject and message type.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub subject_id: Option<String>,
    pub message_types: Option<Vec<MessageType>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject_id: &str) -> Self {
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn types(mut self, types: Vec<MessageType>) -> Self {
        self.message_types = Some(types);
        self
    }

    pub fn matches(&self, event: &ProgressEvent) -> bool {
        if let Some(ref sid) = self.subject_id {
            if &event.subject_id != sid {
                return false;
            }
        }
        if let Some(ref types) = self.message_types {
            if !types.contains(&event.message_type) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::DeliberationPhase;

    fn event(subject: &str, kind: MessageType) -> ProgressEvent {
        ProgressEvent::new(subject, DeliberationPhase::Proposing, kind, "x")
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();
        sink.emit(event("s1", MessageType::Proposal));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.subject_id, "s1");
        assert_eq!(sink.subscriber_count(), 1);
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_panic() {
        let sink = BroadcastSink::new();
        sink.emit(event("s1", MessageType::Vote));
    }

    #[test]
    fn test_recording_sink_counts() {
        let sink = RecordingSink::new();
        sink.emit(event("s1", MessageType::Proposal));
        sink.emit(event("s1", MessageType::Proposal));
        sink.emit(event("s1", MessageType::Synthesis));
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count_of(MessageType::Proposal), 2);
    }

    #[test]
    fn test_filter_matches() {
        let filter = EventFilter::new()
            .subject("s1")
            .types(vec![MessageType::Vote]);
        assert!(filter.matches(&event("s1", MessageType::Vote)));
        assert!(!filter.matches(&event("s2", MessageType::Vote)));
        assert!(!filter.matches(&event("s1", MessageType::Proposal)));
    }
}
