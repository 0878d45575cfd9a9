use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use skyraid_core::events::{GameEvent, GameEventType};
use skyraid_core::protocol::{ServerMessage, decode_server_message};
use skyraid_core::snapshot::{PlayerView, Snapshot};
use skyraid_core::test_helpers::quiet_config;

use skyraid_server::broadcast::ChannelBroadcaster;
use skyraid_server::config::ServerConfig;
use skyraid_server::directory::InMemoryDirectory;
use skyraid_server::room_registry::RoomRegistry;
use skyraid_server::{Server, build_server};

/// Spawn-line x of slot 0 with two slots on an 800-wide arena.
pub const P1_SPAWN_X: f32 = 800.0 / 3.0;
pub const SPAWN_Y: f32 = 560.0;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct TestServer {
    pub registry: RoomRegistry,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub directory: Arc<InMemoryDirectory>,
    pub events: tokio::sync::mpsc::Receiver<GameEvent>,
}

impl TestServer {
    /// Fast ticks, fixed seed, no random power-ups.
    pub fn new() -> Self {
        Self::from_config(fast_config())
    }

    pub fn from_config(config: ServerConfig) -> Self {
        let Server {
            registry,
            broadcaster,
            directory,
            events,
        } = build_server(config);
        Self {
            registry,
            broadcaster,
            directory,
            events,
        }
    }

    pub fn client(&self, room_id: &str) -> SnapshotClient {
        SnapshotClient {
            room_id: room_id.to_string(),
            broadcaster: Arc::clone(&self.broadcaster),
            rx: self.broadcaster.subscribe(room_id),
            current: None,
        }
    }

    /// Wait for the next event of `event_type`, skipping others.
    pub async fn next_event(&mut self, event_type: GameEventType) -> GameEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if event.event_type == event_type {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {event_type:?}"))
    }
}

pub fn fast_config() -> ServerConfig {
    let mut config = ServerConfig {
        sim: quiet_config(),
        ..ServerConfig::default()
    };
    config.sim.tick_rate_ms = 10;
    config.rooms.reap_interval_ms = 20;
    config
}

/// A subscriber that reassembles full snapshots from keyframes and deltas.
pub struct SnapshotClient {
    room_id: String,
    broadcaster: Arc<ChannelBroadcaster>,
    rx: broadcast::Receiver<Bytes>,
    current: Option<Snapshot>,
}

impl SnapshotClient {
    /// Next reconstructed snapshot.
    pub async fn next(&mut self) -> Snapshot {
        tokio::time::timeout(WAIT, async {
            loop {
                let data = match self.rx.recv().await {
                    Ok(data) => data,
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        self.rx = self.broadcaster.subscribe(&self.room_id);
                        self.current = None;
                        continue;
                    },
                    Err(broadcast::error::RecvError::Closed) => panic!("Broadcast closed"),
                };
                let next = match decode_server_message(&data).expect("decode frame") {
                    ServerMessage::Keyframe(snapshot) => Some(snapshot),
                    ServerMessage::Delta(delta) => {
                        self.current.as_ref().and_then(|base| base.apply_delta(&delta).ok())
                    },
                    ServerMessage::GameEvent(_) => None,
                };
                if let Some(snapshot) = next {
                    self.current = Some(snapshot.clone());
                    return snapshot;
                }
            }
        })
        .await
        .expect("Timed out waiting for a snapshot")
    }

    /// Read snapshots until one satisfies `pred`.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> Snapshot
    where
        F: FnMut(&Snapshot) -> bool,
    {
        loop {
            let snapshot = self.next().await;
            if pred(&snapshot) {
                return snapshot;
            }
        }
    }
}

pub fn player<'a>(snapshot: &'a Snapshot, id: &str) -> Option<&'a PlayerView> {
    snapshot.players.iter().find(|p| p.id == id)
}

pub fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}
