//! Event sinks backed by tokio channels

use soundbridge_core::{AudioEvent, EventSink};
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out sink: every subscriber receives every event
///
/// Emitting never blocks. Subscribers that fall more than `capacity`
/// events behind miss the oldest ones.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<AudioEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: AudioEvent) {
        let name = event.name();
        let guild = event.guild_id();
        // Sending only fails when nobody is subscribed
        if self.tx.send(event).is_err() {
            debug!(event = name, guild = %guild, "No event subscribers");
        }
    }
}
