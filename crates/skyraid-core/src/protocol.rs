//! Wire framing: 1-byte message type followed by a MessagePack payload.

use serde::{Deserialize, Serialize};

use crate::events::GameEvent;
use crate::input::PlayerInput;
use crate::snapshot::{Frame, Snapshot, SnapshotDelta};

/// Maximum encoded frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    PlayerInput = 0x01,

    // Server -> Client
    Keyframe = 0x10,
    Delta = 0x11,

    // Server -> Event bus
    GameEvent = 0x20,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::PlayerInput),
            0x10 => Some(Self::Keyframe),
            0x11 => Some(Self::Delta),
            0x20 => Some(Self::GameEvent),
            _ => None,
        }
    }
}

/// Messages a server publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Keyframe(Snapshot),
    Delta(SnapshotDelta),
    GameEvent(GameEvent),
}

impl From<Frame> for ServerMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Keyframe(s) => ServerMessage::Keyframe(s),
            Frame::Delta(d) => ServerMessage::Delta(d),
        }
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::Keyframe(s) => encode_message(MessageType::Keyframe, s),
        ServerMessage::Delta(d) => encode_message(MessageType::Delta, d),
        ServerMessage::GameEvent(e) => encode_message(MessageType::GameEvent, e),
    }
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    match frame {
        Frame::Keyframe(s) => encode_message(MessageType::Keyframe, s),
        Frame::Delta(d) => encode_message(MessageType::Delta, d),
    }
}

pub fn encode_input(input: &PlayerInput) -> Result<Vec<u8>, ProtocolError> {
    encode_message(MessageType::PlayerInput, input)
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyMessage);
    };
    MessageType::from_byte(first).ok_or(ProtocolError::UnknownMessageType(first))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    match decode_message_type(data)? {
        MessageType::Keyframe => Ok(ServerMessage::Keyframe(decode_payload(data)?)),
        MessageType::Delta => Ok(ServerMessage::Delta(decode_payload(data)?)),
        MessageType::GameEvent => Ok(ServerMessage::GameEvent(decode_payload(data)?)),
        MessageType::PlayerInput => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

pub fn decode_input(data: &[u8]) -> Result<PlayerInput, ProtocolError> {
    match decode_message_type(data)? {
        MessageType::PlayerInput => decode_payload(data),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
