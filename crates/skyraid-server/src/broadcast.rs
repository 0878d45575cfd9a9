//! Snapshot fan-out. One named destination per room; subscribers receive
//! encoded frames (keyframe or delta) as `Bytes` for zero-copy cloning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::broadcast;

use skyraid_core::protocol::encode_frame;
use skyraid_core::snapshot::{DeltaEncoder, Snapshot};

/// Destination name a room's snapshots are published to.
pub fn destination(room_id: &str) -> String {
    format!("/topic/rooms/{room_id}")
}

/// Delivery is best-effort and must never block the caller.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, room_id: &str, snapshot: &Snapshot);

    /// The room is gone; release any per-room resources.
    fn close(&self, _room_id: &str) {}
}

struct Topic {
    tx: broadcast::Sender<Bytes>,
    encoder: DeltaEncoder,
}

type SharedTopic = Arc<Mutex<Topic>>;

/// In-process broadcaster backed by one `tokio::sync::broadcast` channel per
/// destination. Lagging subscribers lose frames and should resubscribe, which
/// forces a keyframe.
///
/// The destination map is only locked for lookups. Encoding happens under the
/// room's own topic lock, so rooms never wait on each other.
pub struct ChannelBroadcaster {
    capacity: usize,
    keyframe_interval: u64,
    topics: RwLock<HashMap<String, SharedTopic>>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize, keyframe_interval: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            keyframe_interval,
            topics: RwLock::new(HashMap::new()),
        }
    }

    fn topic(&self, room_id: &str) -> Option<SharedTopic> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&destination(room_id))
            .map(Arc::clone)
    }

    /// Subscribe to a room's destination. The next published frame is a keyframe.
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<Bytes> {
        let topic = match self.topic(room_id) {
            Some(topic) => topic,
            None => {
                let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
                let topic = topics.entry(destination(room_id)).or_insert_with(|| {
                    Arc::new(Mutex::new(Topic {
                        tx: broadcast::channel(self.capacity).0,
                        encoder: DeltaEncoder::new(self.keyframe_interval),
                    }))
                });
                Arc::clone(topic)
            },
        };
        let mut topic = topic.lock().unwrap_or_else(PoisonError::into_inner);
        topic.encoder.force_keyframe();
        topic.tx.subscribe()
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.topic(room_id).map_or(0, |t| {
            t.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .tx
                .receiver_count()
        })
    }

    pub fn has_topic(&self, room_id: &str) -> bool {
        self.topic(room_id).is_some()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, room_id: &str, snapshot: &Snapshot) {
        let Some(topic) = self.topic(room_id) else {
            return;
        };
        let mut topic = topic.lock().unwrap_or_else(PoisonError::into_inner);
        if topic.tx.receiver_count() == 0 {
            topic.encoder.force_keyframe();
            return;
        }
        let frame = topic.encoder.encode(snapshot);
        match encode_frame(&frame) {
            Ok(data) => {
                let _ = topic.tx.send(Bytes::from(data));
            },
            Err(e) => {
                topic.encoder.force_keyframe();
                tracing::error!(room = room_id, tick = snapshot.tick, error = %e, "Failed to encode snapshot");
            },
        }
    }

    fn close(&self, room_id: &str) {
        let removed = self
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&destination(room_id));
        if removed.is_some() {
            tracing::debug!(room = room_id, "Closed broadcast destination");
        }
    }
}
