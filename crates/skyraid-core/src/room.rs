use serde::{Deserialize, Serialize};

pub type RoomId = String;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    /// Fewer members than the minimum; players may move but no waves spawn.
    #[default]
    Waiting,
    Active,
    /// Terminal. The room only serves reconnects until it is reaped.
    Ended,
}

impl RoomState {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: RoomState) -> bool {
        matches!(
            (self, next),
            (RoomState::Waiting, RoomState::Active)
                | (RoomState::Active, RoomState::Ended)
                | (RoomState::Waiting, RoomState::Ended)
        )
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomState::Waiting => "WAITING",
            RoomState::Active => "ACTIVE",
            RoomState::Ended => "ENDED",
        };
        f.write_str(s)
    }
}

/// How `create_or_join` treats a missing or existing room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinMode {
    #[default]
    CreateOrJoin,
    JoinOnly,
    CreateOnly,
}

impl JoinMode {
    pub fn may_create(self) -> bool {
        matches!(self, JoinMode::CreateOrJoin | JoinMode::CreateOnly)
    }

    pub fn may_join_existing(self) -> bool {
        matches!(self, JoinMode::CreateOrJoin | JoinMode::JoinOnly)
    }
}
