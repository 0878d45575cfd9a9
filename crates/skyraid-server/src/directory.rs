//! Shared room-metadata cache. Advisory only: the registry is authoritative.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use skyraid_core::room::RoomState;

/// Summary of a room as published to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub state: RoomState,
    pub members: Vec<String>,
    pub max_players: usize,
}

/// Key/value cache with per-entry TTL.
pub trait RoomDirectory: Send + Sync {
    fn get(&self, room_id: &str) -> Option<RoomSummary>;
    fn set(&self, summary: RoomSummary, ttl: Duration);
    fn expire(&self, room_id: &str);
}

/// Process-local directory. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: Mutex<HashMap<String, (RoomSummary, Instant)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoomDirectory for InMemoryDirectory {
    fn get(&self, room_id: &str) -> Option<RoomSummary> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(room_id) {
            Some((summary, expires_at)) if *expires_at > Instant::now() => Some(summary.clone()),
            Some(_) => {
                entries.remove(room_id);
                None
            },
            None => None,
        }
    }

    fn set(&self, summary: RoomSummary, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(summary.room_id.clone(), (summary, expires_at));
    }

    fn expire(&self, room_id: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room_id);
    }
}
