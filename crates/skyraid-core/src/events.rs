use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::achievements::Achievement;
use crate::player::PlayerId;

/// Lifecycle event kinds handed to the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameEventType {
    GameEnded,
    WaveCleared,
    AchievementUnlocked,
    PlayerJoined,
    PlayerLeft,
    PlayerFlagged,
}

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Victory,
    Defeat,
}

/// Event record `{type, roomId, tick, payload}`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub event_type: GameEventType,
    pub room_id: String,
    pub tick: u64,
    pub payload: BTreeMap<String, Value>,
}

impl GameEvent {
    pub fn new(event_type: GameEventType, room_id: impl Into<String>, tick: u64) -> Self {
        Self {
            event_type,
            room_id: room_id.into(),
            tick,
            payload: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

/// A state transition observed during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    PlayerJoined {
        player_id: PlayerId,
        members: usize,
    },
    PlayerLeft {
        player_id: PlayerId,
        members: usize,
    },
    WaveCleared {
        wave: u32,
    },
    GameEnded {
        outcome: Outcome,
        wave: u32,
        /// Final scores in player id order.
        scores: Vec<(PlayerId, u64)>,
    },
    AchievementUnlocked {
        player_id: PlayerId,
        achievement: Achievement,
    },
    PlayerFlagged {
        player_id: PlayerId,
        violations: usize,
    },
}

impl Transition {
    pub fn event_type(&self) -> GameEventType {
        match self {
            Transition::PlayerJoined { .. } => GameEventType::PlayerJoined,
            Transition::PlayerLeft { .. } => GameEventType::PlayerLeft,
            Transition::WaveCleared { .. } => GameEventType::WaveCleared,
            Transition::GameEnded { .. } => GameEventType::GameEnded,
            Transition::AchievementUnlocked { .. } => GameEventType::AchievementUnlocked,
            Transition::PlayerFlagged { .. } => GameEventType::PlayerFlagged,
        }
    }

    pub fn into_event(self, room_id: &str, tick: u64) -> GameEvent {
        let event = GameEvent::new(self.event_type(), room_id, tick);
        match self {
            Transition::PlayerJoined { player_id, members }
            | Transition::PlayerLeft { player_id, members } => event
                .with("playerId", player_id)
                .with("members", members),
            Transition::WaveCleared { wave } => event.with("wave", wave),
            Transition::GameEnded {
                outcome,
                wave,
                scores,
            } => {
                let scores: serde_json::Map<String, Value> = scores
                    .into_iter()
                    .map(|(id, score)| (id, json!(score)))
                    .collect();
                event
                    .with("outcome", json!(outcome))
                    .with("wave", wave)
                    .with("scores", Value::Object(scores))
            },
            Transition::AchievementUnlocked {
                player_id,
                achievement,
            } => event
                .with("playerId", player_id)
                .with("achievement", achievement.as_str()),
            Transition::PlayerFlagged {
                player_id,
                violations,
            } => event
                .with("playerId", player_id)
                .with("violations", violations),
        }
    }
}
