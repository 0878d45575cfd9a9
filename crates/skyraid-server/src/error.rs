use skyraid_core::room::RoomId;

/// Typed failures returned by the room registry. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    RoomFull(RoomId),
    RoomNotFound(RoomId),
    RoomAlreadyExists(RoomId),
    NotInRoom { room_id: RoomId, player_id: String },
    /// The room's bounded input queue is at capacity; the input was dropped.
    InputQueueFull(RoomId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomFull(id) => write!(f, "room {id} is full"),
            Self::RoomNotFound(id) => write!(f, "room {id} not found"),
            Self::RoomAlreadyExists(id) => write!(f, "room {id} already exists"),
            Self::NotInRoom { room_id, player_id } => {
                write!(f, "player {player_id} is not in room {room_id}")
            },
            Self::InputQueueFull(id) => write!(f, "input queue for room {id} is full"),
        }
    }
}

impl std::error::Error for RegistryError {}
