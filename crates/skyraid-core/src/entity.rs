use serde::{Deserialize, Serialize};

use crate::ai::EnemyPattern;
use crate::geometry::{Aabb, Vec2};
use crate::player::PlayerId;
use crate::powerup::PowerUpKind;

/// Entity id, unique within a room and never reused.
pub type EntityId = u64;

/// Monotonic id source for one room.
#[derive(Debug, Clone)]
pub struct EntityIds {
    next: EntityId,
}

impl Default for EntityIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl EntityIds {
    pub fn alloc(&mut self) -> EntityId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Who fired a bullet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "id", rename_all = "camelCase")]
pub enum Shooter {
    Player(PlayerId),
    Enemy(EntityId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    pub pattern: EnemyPattern,
    pub health: u32,
    pub score_value: u32,
    pub fire_interval_ticks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Bullet { owner: Shooter, damage: u32 },
    Enemy(Enemy),
    PowerUp(PowerUpKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub half_size: f32,
    pub spawn_tick: u64,
    /// Removed at the start of this tick's expiry check. `None` lives until destroyed.
    pub expires_at: Option<u64>,
}

impl Entity {
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.position, Vec2::new(self.half_size, self.half_size))
    }

    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.spawn_tick)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    pub fn as_enemy(&self) -> Option<&Enemy> {
        match &self.kind {
            EntityKind::Enemy(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_player_bullet(&self) -> bool {
        matches!(
            self.kind,
            EntityKind::Bullet {
                owner: Shooter::Player(_),
                ..
            }
        )
    }

    pub fn is_enemy_bullet(&self) -> bool {
        matches!(
            self.kind,
            EntityKind::Bullet {
                owner: Shooter::Enemy(_),
                ..
            }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EntityKind::Bullet { .. } => "bullet",
            EntityKind::Enemy(_) => "enemy",
            EntityKind::PowerUp(_) => "powerUp",
        }
    }
}
