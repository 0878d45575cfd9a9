//! Event bus sinks. Emission is fire-and-forget: a full or closed sink drops
//! the event and logs it, the tick loop never waits.

use tokio::sync::mpsc;

use skyraid_core::events::GameEvent;

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &GameEvent);
}

/// Forwards events into a bounded channel consumed by an external publisher.
pub struct ChannelEventEmitter {
    tx: mpsc::Sender<GameEvent>,
}

impl ChannelEventEmitter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<GameEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEventEmitter {
    fn emit(&self, event: &GameEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            tracing::warn!(
                room = %event.room_id,
                tick = event.tick,
                event = ?event.event_type,
                error = %e,
                "Dropping game event"
            );
        }
    }
}

/// Logs every event as a structured `info` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventEmitter;

impl EventEmitter for TracingEventEmitter {
    fn emit(&self, event: &GameEvent) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        tracing::info!(
            room = %event.room_id,
            tick = event.tick,
            event = ?event.event_type,
            %payload,
            "Game event"
        );
    }
}
