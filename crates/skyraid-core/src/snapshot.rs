//! Per-tick authoritative state and its delta encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId, EntityKind, Shooter};
use crate::player::{PlayerId, PlayerState};
use crate::powerup::{ActiveEffect, PowerUpKind};
use crate::room::RoomState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub health: u32,
    pub score: u64,
    pub alive: bool,
    pub effects: Vec<ActiveEffect>,
}

impl From<&PlayerState> for PlayerView {
    fn from(p: &PlayerState) -> Self {
        Self {
            id: p.id.clone(),
            x: p.position.x,
            y: p.position.y,
            health: p.health,
            score: p.score,
            alive: p.is_alive(),
            effects: p.effects.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityViewKind {
    Bullet,
    Enemy,
    PowerUp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    pub id: EntityId,
    pub kind: EntityViewKind,
    /// Pattern name for enemies, effect name for power-ups, shooter side for bullets.
    pub subtype: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub health: Option<u32>,
    pub powerup: Option<PowerUpKind>,
}

impl From<&Entity> for EntityView {
    fn from(e: &Entity) -> Self {
        let (kind, subtype, health, powerup) = match &e.kind {
            EntityKind::Bullet { owner, .. } => {
                let side = match owner {
                    Shooter::Player(_) => "player",
                    Shooter::Enemy(_) => "enemy",
                };
                (EntityViewKind::Bullet, side.to_string(), None, None)
            },
            EntityKind::Enemy(enemy) => (
                EntityViewKind::Enemy,
                enemy.pattern.name().to_string(),
                Some(enemy.health),
                None,
            ),
            EntityKind::PowerUp(kind) => (
                EntityViewKind::PowerUp,
                kind.as_str().to_string(),
                None,
                Some(*kind),
            ),
        };
        Self {
            id: e.id,
            kind,
            subtype,
            x: e.position.x,
            y: e.position.y,
            vx: e.velocity.x,
            vy: e.velocity.y,
            health,
            powerup,
        }
    }
}

/// Authoritative state of a room at one tick. Players and entities are sorted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub room_id: String,
    pub tick: u64,
    pub wave: u32,
    pub state: RoomState,
    pub players: Vec<PlayerView>,
    pub entities: Vec<EntityView>,
}

/// Changes between two snapshots of the same room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDelta {
    pub room_id: String,
    pub base_tick: u64,
    pub tick: u64,
    pub wave: u32,
    pub state: RoomState,
    /// New or changed players.
    pub players: Vec<PlayerView>,
    pub removed_players: Vec<PlayerId>,
    /// New or changed entities.
    pub entities: Vec<EntityView>,
    pub removed_entities: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaError {
    RoomMismatch { expected: String, got: String },
    BaseMismatch { base_tick: u64, have_tick: u64 },
}

impl std::fmt::Display for DeltaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomMismatch { expected, got } => {
                write!(f, "delta for room {got} applied to room {expected}")
            },
            Self::BaseMismatch {
                base_tick,
                have_tick,
            } => write!(f, "delta based on tick {base_tick}, have tick {have_tick}"),
        }
    }
}

impl std::error::Error for DeltaError {}

impl Snapshot {
    /// Diff `self` against an earlier snapshot of the same room.
    pub fn diff(&self, base: &Snapshot) -> SnapshotDelta {
        let (players, removed_players) = diff_by_id(&base.players, &self.players, |p| p.id.clone());
        let (entities, removed_entities) = diff_by_id(&base.entities, &self.entities, |e| e.id);
        SnapshotDelta {
            room_id: self.room_id.clone(),
            base_tick: base.tick,
            tick: self.tick,
            wave: self.wave,
            state: self.state,
            players,
            removed_players,
            entities,
            removed_entities,
        }
    }

    /// Reconstruct the snapshot `delta` describes.
    pub fn apply_delta(&self, delta: &SnapshotDelta) -> Result<Snapshot, DeltaError> {
        if delta.room_id != self.room_id {
            return Err(DeltaError::RoomMismatch {
                expected: self.room_id.clone(),
                got: delta.room_id.clone(),
            });
        }
        if delta.base_tick != self.tick {
            return Err(DeltaError::BaseMismatch {
                base_tick: delta.base_tick,
                have_tick: self.tick,
            });
        }
        Ok(Snapshot {
            room_id: self.room_id.clone(),
            tick: delta.tick,
            wave: delta.wave,
            state: delta.state,
            players: patch_by_id(
                &self.players,
                &delta.players,
                &delta.removed_players,
                |p| p.id.clone(),
            ),
            entities: patch_by_id(
                &self.entities,
                &delta.entities,
                &delta.removed_entities,
                |e| e.id,
            ),
        })
    }
}

fn diff_by_id<T, K, F>(base: &[T], next: &[T], key: F) -> (Vec<T>, Vec<K>)
where
    T: Clone + PartialEq,
    K: Ord,
    F: Fn(&T) -> K,
{
    let before: BTreeMap<K, &T> = base.iter().map(|v| (key(v), v)).collect();
    let after: BTreeMap<K, &T> = next.iter().map(|v| (key(v), v)).collect();
    let changed = next
        .iter()
        .filter(|v| before.get(&key(v)).is_none_or(|old| *old != *v))
        .cloned()
        .collect();
    let removed = before
        .into_keys()
        .filter(|k| !after.contains_key(k))
        .collect();
    (changed, removed)
}

fn patch_by_id<T, K, F>(base: &[T], changed: &[T], removed: &[K], key: F) -> Vec<T>
where
    T: Clone,
    K: Ord + Clone,
    F: Fn(&T) -> K,
{
    let mut merged: BTreeMap<K, T> = base.iter().map(|v| (key(v), v.clone())).collect();
    for k in removed {
        merged.remove(k);
    }
    for v in changed {
        merged.insert(key(v), v.clone());
    }
    merged.into_values().collect()
}

/// One broadcast unit: either a full snapshot or a delta against the previous frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Keyframe(Snapshot),
    Delta(SnapshotDelta),
}

/// Emits a keyframe every `keyframe_interval` ticks and deltas in between.
#[derive(Debug, Clone)]
pub struct DeltaEncoder {
    keyframe_interval: u64,
    last: Option<Snapshot>,
    since_keyframe: u64,
}

impl DeltaEncoder {
    pub fn new(keyframe_interval: u64) -> Self {
        Self {
            keyframe_interval: keyframe_interval.max(1),
            last: None,
            since_keyframe: 0,
        }
    }

    /// Next emitted frame will be a keyframe.
    pub fn force_keyframe(&mut self) {
        self.last = None;
    }

    pub fn encode(&mut self, snapshot: &Snapshot) -> Frame {
        let frame = match &self.last {
            Some(prev) if self.since_keyframe < self.keyframe_interval && prev.tick < snapshot.tick => {
                self.since_keyframe += 1;
                Frame::Delta(snapshot.diff(prev))
            },
            _ => {
                self.since_keyframe = 1;
                Frame::Keyframe(snapshot.clone())
            },
        };
        self.last = Some(snapshot.clone());
        frame
    }
}
