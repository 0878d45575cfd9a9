use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use skyraid_core::input::{InputFrame, PlayerInput};
use skyraid_core::player::PlayerId;
use skyraid_core::room::{JoinMode, RoomId, RoomState};
use skyraid_core::sim::RoomSim;

use crate::config::ServerConfig;
use crate::directory::{RoomDirectory, RoomSummary};
use crate::error::RegistryError;
use crate::game_loop::{RoomCommand, RoomLoop, RoomSinks, RoomStatus, spawn_room_loop};

/// What a caller learns about a room after joining it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub state: RoomState,
    pub members: Vec<PlayerId>,
    pub tick: u64,
}

struct RoomEntry {
    room: RoomLoop,
    members: BTreeSet<PlayerId>,
    /// Everyone who was ever a member; only they may reconnect after the end.
    seen: BTreeSet<PlayerId>,
    last_reconnect: Option<Instant>,
}

impl RoomEntry {
    /// Start of the grace period an ENDED room is kept for.
    fn grace_start(&self, status: &RoomStatus) -> Option<Instant> {
        let ended_at = status.ended_at?;
        Some(self.last_reconnect.map_or(ended_at, |r| r.max(ended_at)))
    }
}

/// Owns every live room. Cheap to clone; all clones share the same map.
#[derive(Clone)]
pub struct RoomRegistry {
    config: Arc<ServerConfig>,
    rooms: Arc<RwLock<HashMap<RoomId, RoomEntry>>>,
    sinks: RoomSinks,
    directory: Option<Arc<dyn RoomDirectory>>,
}

impl RoomRegistry {
    pub fn new(config: ServerConfig, sinks: RoomSinks) -> Self {
        Self {
            config: Arc::new(config),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            sinks,
            directory: None,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn RoomDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Create a room if it is absent and `mode` allows it, otherwise join it.
    ///
    /// A join is applied by the room's next tick; the returned state is the
    /// state after that tick.
    pub async fn create_or_join(
        &self,
        room_id: Option<RoomId>,
        player_id: impl Into<PlayerId>,
        mode: JoinMode,
    ) -> Result<RoomInfo, RegistryError> {
        let player_id = player_id.into();
        let (room_id, members, reply_rx) = {
            let mut rooms = self.rooms.write().await;
            let room_id = match room_id {
                Some(id) => id,
                None if mode.may_create() => fresh_room_id(&rooms),
                None => return Err(RegistryError::RoomNotFound(String::new())),
            };

            if !rooms.contains_key(&room_id) {
                if !mode.may_create() {
                    return Err(RegistryError::RoomNotFound(room_id));
                }
                let entry = self.start_room(&room_id);
                rooms.insert(room_id.clone(), entry);
            } else if !mode.may_join_existing() {
                return Err(RegistryError::RoomAlreadyExists(room_id));
            }

            let Some(entry) = rooms.get_mut(&room_id) else {
                return Err(RegistryError::RoomNotFound(room_id));
            };
            let status = entry.room.status();

            if status.state == RoomState::Ended {
                let within_grace = entry
                    .grace_start(&status)
                    .is_some_and(|t| t.elapsed() < self.ended_grace());
                if !entry.seen.contains(&player_id) || !within_grace {
                    return Err(RegistryError::RoomNotFound(room_id));
                }
                entry.last_reconnect = Some(Instant::now());
            } else if entry.members.contains(&player_id) {
                return Ok(RoomInfo {
                    room_id,
                    state: status.state,
                    members: entry.members.iter().cloned().collect(),
                    tick: status.tick,
                });
            } else if entry.members.len() >= self.config.sim.room.max_players {
                return Err(RegistryError::RoomFull(room_id));
            } else {
                entry.members.insert(player_id.clone());
                entry.seen.insert(player_id.clone());
            }

            let (reply, reply_rx) = oneshot::channel();
            let sent = entry.room.cmd_tx.send(RoomCommand::Join {
                player_id: player_id.clone(),
                reply,
            });
            if sent.is_err() {
                entry.members.remove(&player_id);
                return Err(RegistryError::RoomNotFound(room_id));
            }
            (room_id, entry.members.iter().cloned().collect::<Vec<_>>(), reply_rx)
        };

        let status = reply_rx
            .await
            .map_err(|_| RegistryError::RoomNotFound(room_id.clone()))?;

        tracing::info!(room = %room_id, %player_id, state = %status.state, members = members.len(), "Player joined room");
        self.publish_summary(&room_id, status.state, &members);

        Ok(RoomInfo {
            room_id,
            state: status.state,
            members,
            tick: status.tick,
        })
    }

    pub async fn leave(&self, room_id: &str, player_id: &str) -> Result<(), RegistryError> {
        let (state, members) = {
            let mut rooms = self.rooms.write().await;
            let entry = rooms
                .get_mut(room_id)
                .ok_or_else(|| RegistryError::RoomNotFound(room_id.to_string()))?;
            if !entry.members.remove(player_id) {
                return Err(RegistryError::NotInRoom {
                    room_id: room_id.to_string(),
                    player_id: player_id.to_string(),
                });
            }
            let _ = entry.room.cmd_tx.send(RoomCommand::Leave {
                player_id: player_id.to_string(),
            });
            (
                entry.room.status().state,
                entry.members.iter().cloned().collect::<Vec<_>>(),
            )
        };
        tracing::info!(room = room_id, player_id, members = members.len(), "Player left room");
        self.publish_summary(room_id, state, &members);
        Ok(())
    }

    /// Enqueue an input for the room's next tick. Never waits on the room.
    pub async fn submit_input(
        &self,
        room_id: &str,
        player_id: &str,
        frame: InputFrame,
    ) -> Result<(), RegistryError> {
        let rooms = self.rooms.read().await;
        let entry = rooms
            .get(room_id)
            .filter(|e| e.room.status().state != RoomState::Ended)
            .ok_or_else(|| RegistryError::RoomNotFound(room_id.to_string()))?;
        if !entry.members.contains(player_id) {
            return Err(RegistryError::NotInRoom {
                room_id: room_id.to_string(),
                player_id: player_id.to_string(),
            });
        }
        match entry.room.input_tx.try_send(PlayerInput::new(player_id, frame)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(room = room_id, player_id, "Input queue full, dropping input");
                Err(RegistryError::InputQueueFull(room_id.to_string()))
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(RegistryError::RoomNotFound(room_id.to_string()))
            },
        }
    }

    /// Stop a room's task and release it. Returns false if the room was absent.
    pub async fn destroy(&self, room_id: &str) -> bool {
        let Some(entry) = self.rooms.write().await.remove(room_id) else {
            return false;
        };
        if let Some(directory) = &self.directory {
            directory.expire(room_id);
        }
        let status = entry.room.status();
        entry.room.shutdown().await;
        tracing::info!(room = room_id, tick = status.tick, state = %status.state, "Room destroyed");
        true
    }

    /// Destroy idle, expired and crashed rooms. Returns how many were removed.
    pub async fn reap(&self) -> usize {
        let idle_timeout = self.config.rooms.idle_timeout_ticks;
        let grace = self.ended_grace();
        let doomed: Vec<RoomId> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .filter(|(id, entry)| {
                    let status = entry.room.status();
                    if entry.room.is_finished() && status.state != RoomState::Ended {
                        tracing::warn!(room = %id, tick = status.tick, "Room task exited unexpectedly");
                        return true;
                    }
                    match status.state {
                        RoomState::Ended => entry.grace_start(&status).is_none_or(|t| t.elapsed() >= grace),
                        _ => status.empty_ticks >= idle_timeout,
                    }
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut removed = 0;
        for room_id in doomed {
            if self.destroy(&room_id).await {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Reaped rooms");
        }
        removed
    }

    /// Run `reap` on a fixed interval. Abort the returned handle to stop it.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let registry = self.clone();
        let period = Duration::from_millis(self.config.rooms.reap_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                registry.reap().await;
            }
        })
    }

    pub async fn room_info(&self, room_id: &str) -> Option<RoomInfo> {
        let rooms = self.rooms.read().await;
        let entry = rooms.get(room_id)?;
        let status = entry.room.status();
        Some(RoomInfo {
            room_id: room_id.to_string(),
            state: status.state,
            members: entry.members.iter().cloned().collect(),
            tick: status.tick,
        })
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Stop every room. Used on process shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        for room_id in ids {
            self.destroy(&room_id).await;
        }
    }

    fn start_room(&self, room_id: &str) -> RoomEntry {
        let sim = RoomSim::new(room_id, self.config.sim.clone());
        let room = spawn_room_loop(sim, self.config.rooms.input_queue_capacity, self.sinks.clone());
        tracing::info!(room = room_id, "Room created");
        RoomEntry {
            room,
            members: BTreeSet::new(),
            seen: BTreeSet::new(),
            last_reconnect: None,
        }
    }

    fn ended_grace(&self) -> Duration {
        Duration::from_secs(self.config.rooms.ended_grace_secs)
    }

    fn publish_summary(&self, room_id: &str, state: RoomState, members: &[PlayerId]) {
        if let Some(directory) = &self.directory {
            directory.set(
                RoomSummary {
                    room_id: room_id.to_string(),
                    state,
                    members: members.to_vec(),
                    max_players: self.config.sim.room.max_players,
                },
                Duration::from_secs(self.config.rooms.directory_ttl_secs),
            );
        }
    }
}

fn fresh_room_id(rooms: &HashMap<RoomId, RoomEntry>) -> RoomId {
    loop {
        let id = uuid::Uuid::new_v4().to_string();
        if !rooms.contains_key(&id) {
            return id;
        }
    }
}
