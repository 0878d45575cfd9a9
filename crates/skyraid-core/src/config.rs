use serde::{Deserialize, Serialize};

use crate::collision::{BroadPhaseKind, HitShape};
use crate::geometry::Arena;
use crate::powerup::StackingPolicy;
use crate::wave::WaveScript;

/// Data-driven configuration for a room simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed tick interval in milliseconds (33 ms ≈ 30 Hz).
    pub tick_rate_ms: u64,
    /// Seed for spawn policies. `None` derives a seed from the room id.
    pub seed: Option<u64>,
    pub room: RoomRules,
    pub arena: Arena,
    pub player: PlayerTuning,
    pub anticheat: AntiCheatConfig,
    pub bullets: BulletTuning,
    pub enemies: EnemyTuning,
    pub powerups: PowerUpConfig,
    pub collision: CollisionConfig,
    pub waves: WaveConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 33,
            seed: None,
            room: RoomRules::default(),
            arena: Arena::default(),
            player: PlayerTuning::default(),
            anticheat: AntiCheatConfig::default(),
            bullets: BulletTuning::default(),
            enemies: EnemyTuning::default(),
            powerups: PowerUpConfig::default(),
            collision: CollisionConfig::default(),
            waves: WaveConfig::default(),
        }
    }
}

/// Membership rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomRules {
    pub max_players: usize,
    /// Players required before the room leaves WAITING.
    pub min_players: usize,
}

impl Default for RoomRules {
    fn default() -> Self {
        Self {
            max_players: 2,
            min_players: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub max_health: u32,
    /// Half side length of the player's hit box.
    pub half_size: f32,
    /// Distance of the spawn line above the bottom edge.
    pub spawn_margin: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            max_health: 100,
            half_size: 12.0,
            spawn_margin: 40.0,
        }
    }
}

/// Anti-cheat thresholds applied by the input validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    /// Maximum plausible movement speed in units/second.
    pub max_speed: f32,
    /// Minimum client-clock gap between two accepted shots.
    pub fire_cooldown_ms: u64,
    /// Strikes inside the rolling window that flag a player for disconnect.
    pub violation_threshold: usize,
    /// Width of the rolling strike window, in ticks.
    pub violation_window_ticks: u64,
    /// Extra server-side time granted on top of elapsed ticks to absorb jitter.
    pub clock_slack_ms: u64,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_speed: 300.0,
            fire_cooldown_ms: 200,
            violation_threshold: 10,
            violation_window_ticks: 300,
            clock_slack_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletTuning {
    pub player_speed: f32,
    pub enemy_speed: f32,
    pub half_size: f32,
    /// Damage a player bullet deals to an enemy.
    pub player_damage: u32,
    /// Damage an enemy bullet deals to a player.
    pub enemy_damage: u32,
    pub ttl_ticks: u64,
}

impl Default for BulletTuning {
    fn default() -> Self {
        Self {
            player_speed: 600.0,
            enemy_speed: 250.0,
            half_size: 3.0,
            player_damage: 10,
            enemy_damage: 10,
            ttl_ticks: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyTuning {
    pub half_size: f32,
    pub base_health: u32,
    pub health_per_wave: u32,
    /// Damage dealt when an enemy rams a player (the enemy is destroyed).
    pub contact_damage: u32,
    pub score_value: u32,
    /// Ticks between shots for patterns that fire.
    pub fire_interval_ticks: u32,
}

impl Default for EnemyTuning {
    fn default() -> Self {
        Self {
            half_size: 14.0,
            base_health: 20,
            health_per_wave: 5,
            contact_damage: 25,
            score_value: 100,
            fire_interval_ticks: 60,
        }
    }
}

/// Power-up spawn policy and effect tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerUpConfig {
    /// Base spawn probability per tick at wave 1.
    pub spawn_rate: f64,
    /// Additional fraction of `spawn_rate` per wave past the first.
    pub wave_scale: f64,
    /// Maximum power-ups on the field at once.
    pub max_active: usize,
    pub ttl_ticks: u64,
    pub drift_speed: f32,
    pub half_size: f32,
    pub stacking: StackingPolicy,
    pub rapid_fire_ticks: u64,
    pub shield_ticks: u64,
    pub speed_boost_ticks: u64,
    /// Fire cooldown multiplier while rapid fire is active.
    pub rapid_fire_multiplier: f32,
    /// Max speed multiplier while speed boost is active.
    pub speed_boost_multiplier: f32,
}

impl Default for PowerUpConfig {
    fn default() -> Self {
        Self {
            spawn_rate: 0.004,
            wave_scale: 0.25,
            max_active: 2,
            ttl_ticks: 300,
            drift_speed: 60.0,
            half_size: 10.0,
            stacking: StackingPolicy::Refresh,
            rapid_fire_ticks: 240,
            shield_ticks: 180,
            speed_boost_ticks: 240,
            rapid_fire_multiplier: 0.5,
            speed_boost_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub shape: HitShape,
    pub broad_phase: BroadPhaseKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Enemies in the first procedural wave.
    pub base_count: u32,
    /// Enemies added per subsequent wave.
    pub count_per_wave: u32,
    /// Clearing this wave ends the game with a victory. `None` plays forever.
    pub max_waves: Option<u32>,
    /// Hand-authored waves, used in order before procedural generation takes over.
    pub scripted: Vec<WaveScript>,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            base_count: 4,
            count_per_wave: 2,
            max_waves: None,
            scripted: Vec::new(),
        }
    }
}

/// A configuration value that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid config `{}`: {}", self.field, self.reason)
    }
}

impl std::error::Error for ConfigError {}

impl SimConfig {
    /// Tick duration in seconds, used as the Euler step.
    pub fn dt(&self) -> f32 {
        self.tick_rate_ms as f32 / 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_ms == 0 {
            return Err(ConfigError::new("sim.tick_rate_ms", "must be > 0"));
        }
        if self.room.max_players == 0 {
            return Err(ConfigError::new("sim.room.max_players", "must be > 0"));
        }
        if self.room.min_players == 0 || self.room.min_players > self.room.max_players {
            return Err(ConfigError::new(
                "sim.room.min_players",
                format!("must be in 1..={}", self.room.max_players),
            ));
        }
        if !(self.arena.width > 0.0 && self.arena.height > 0.0) {
            return Err(ConfigError::new("sim.arena", "width and height must be > 0"));
        }
        if !(self.anticheat.max_speed.is_finite() && self.anticheat.max_speed > 0.0) {
            return Err(ConfigError::new("sim.anticheat.max_speed", "must be a positive number"));
        }
        if self.anticheat.violation_threshold == 0 {
            return Err(ConfigError::new("sim.anticheat.violation_threshold", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.powerups.spawn_rate) {
            return Err(ConfigError::new("sim.powerups.spawn_rate", "must be within [0, 1]"));
        }
        if !(self.powerups.wave_scale.is_finite() && self.powerups.wave_scale >= 0.0) {
            return Err(ConfigError::new("sim.powerups.wave_scale", "must be a finite number >= 0"));
        }
        if self.bullets.ttl_ticks == 0 {
            return Err(ConfigError::new("sim.bullets.ttl_ticks", "must be > 0"));
        }
        // An empty wave would clear on the tick it starts, every tick.
        if self.waves.base_count == 0 {
            return Err(ConfigError::new("sim.waves.base_count", "must be > 0"));
        }
        if let Some(i) = self.waves.scripted.iter().position(|w| w.enemies.is_empty()) {
            return Err(ConfigError::new(
                "sim.waves.scripted",
                format!("wave {} has no enemies", i + 1),
            ));
        }
        if self.waves.max_waves == Some(0) {
            return Err(ConfigError::new("sim.waves.max_waves", "must be > 0 when set"));
        }
        Ok(())
    }
}
