use std::collections::BTreeSet;

use crate::achievements::Achievement;
use crate::geometry::{Aabb, Vec2};
use crate::input::AntiCheatState;
use crate::powerup::{ActiveEffect, PowerUpKind, has_effect};

/// Opaque player identifier assigned by the transport layer.
pub type PlayerId = String;

/// Authoritative per-player state, owned by the room simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: PlayerId,
    /// Join order slot, used for spawn placement.
    pub slot: usize,
    pub position: Vec2,
    pub health: u32,
    pub score: u64,
    pub kills: u32,
    pub effects: Vec<ActiveEffect>,
    pub anticheat: AntiCheatState,
    pub achievements: BTreeSet<Achievement>,
    /// Reset when a new wave spawns.
    pub damage_taken_this_wave: u32,
}

impl PlayerState {
    pub fn new(id: PlayerId, slot: usize, position: Vec2, health: u32) -> Self {
        Self {
            id,
            slot,
            position,
            health,
            score: 0,
            kills: 0,
            effects: Vec::new(),
            anticheat: AntiCheatState::default(),
            achievements: BTreeSet::new(),
            damage_taken_this_wave: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn bounds(&self, half_size: f32) -> Aabb {
        Aabb::new(self.position, Vec2::new(half_size, half_size))
    }

    pub fn has_effect(&self, kind: PowerUpKind, now: u64) -> bool {
        has_effect(&self.effects, kind, now)
    }

    /// Apply damage unless a shield is up. Returns the damage actually taken.
    pub fn take_damage(&mut self, amount: u32, now: u64) -> u32 {
        if amount == 0 || !self.is_alive() || self.has_effect(PowerUpKind::Shield, now) {
            return 0;
        }
        let taken = amount.min(self.health);
        self.health -= taken;
        self.damage_taken_this_wave += taken;
        taken
    }
}

/// Spawn point for a join slot: evenly spaced along a line near the bottom edge.
pub fn spawn_position(slot: usize, max_players: usize, width: f32, height: f32, margin: f32) -> Vec2 {
    let max = max_players.max(1) as f32;
    let x = width * (slot.min(max_players) as f32 + 1.0) / (max + 1.0);
    Vec2::new(x, (height - margin).max(0.0))
}
