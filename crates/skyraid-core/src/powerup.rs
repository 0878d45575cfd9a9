use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PowerUpConfig;
use crate::geometry::Arena;

/// Power-up types that can drop during a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    RapidFire,
    Shield,
    SpeedBoost,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [
        PowerUpKind::RapidFire,
        PowerUpKind::Shield,
        PowerUpKind::SpeedBoost,
    ];

    /// Effect duration in ticks.
    pub fn duration_ticks(&self, cfg: &PowerUpConfig) -> u64 {
        match self {
            PowerUpKind::RapidFire => cfg.rapid_fire_ticks,
            PowerUpKind::Shield => cfg.shield_ticks,
            PowerUpKind::SpeedBoost => cfg.speed_boost_ticks,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerUpKind::RapidFire => "rapidFire",
            PowerUpKind::Shield => "shield",
            PowerUpKind::SpeedBoost => "speedBoost",
        }
    }
}

/// How a pickup combines with an active effect of the same kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackingPolicy {
    /// Expiry resets to `now + duration`.
    #[default]
    Refresh,
    /// Remaining duration is extended by another `duration`.
    Additive,
}

/// Timed effect on a player. Active while `now < expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    pub kind: PowerUpKind,
    pub expires_at: u64,
}

impl ActiveEffect {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

pub fn has_effect(effects: &[ActiveEffect], kind: PowerUpKind, now: u64) -> bool {
    effects
        .iter()
        .any(|e| e.kind == kind && !e.is_expired(now))
}

/// Apply a pickup. There is at most one entry per kind; returns the new expiry tick.
pub fn apply_pickup(
    effects: &mut Vec<ActiveEffect>,
    kind: PowerUpKind,
    now: u64,
    cfg: &PowerUpConfig,
) -> u64 {
    let duration = kind.duration_ticks(cfg);
    if let Some(existing) = effects.iter_mut().find(|e| e.kind == kind) {
        existing.expires_at = match cfg.stacking {
            StackingPolicy::Refresh => now + duration,
            StackingPolicy::Additive => existing.expires_at.max(now) + duration,
        };
        return existing.expires_at;
    }
    let expires_at = now + duration;
    effects.push(ActiveEffect { kind, expires_at });
    effects.sort_by_key(|e| e.kind);
    expires_at
}

/// Drop expired effects, returning the kinds that ended.
pub fn expire_effects(effects: &mut Vec<ActiveEffect>, now: u64) -> Vec<PowerUpKind> {
    let mut ended = Vec::new();
    effects.retain(|e| {
        if e.is_expired(now) {
            ended.push(e.kind);
            false
        } else {
            true
        }
    });
    ended
}

/// A power-up the spawn policy decided to drop this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerUpSpawn {
    pub kind: PowerUpKind,
    pub x: f32,
}

/// Per-tick spawn probability for the given wave (1-based).
pub fn spawn_probability(wave: u32, cfg: &PowerUpConfig) -> f64 {
    let scale = 1.0 + cfg.wave_scale * f64::from(wave.saturating_sub(1));
    let p = cfg.spawn_rate * scale;
    if !p.is_finite() {
        return 0.0;
    }
    p.clamp(0.0, 1.0)
}

/// Roll the spawn policy once. Consumes randomness only when below the cap.
pub fn roll_spawn<R: Rng>(
    rng: &mut R,
    wave: u32,
    active: usize,
    arena: &Arena,
    cfg: &PowerUpConfig,
) -> Option<PowerUpSpawn> {
    if active >= cfg.max_active {
        return None;
    }
    if !rng.random_bool(spawn_probability(wave, cfg)) {
        return None;
    }
    let kind = PowerUpKind::ALL[rng.random_range(0..PowerUpKind::ALL.len())];
    let margin = cfg.half_size.min(arena.width / 2.0);
    let x = if arena.width - margin > margin {
        rng.random_range(margin..arena.width - margin)
    } else {
        arena.width / 2.0
    };
    Some(PowerUpSpawn { kind, x })
}
