//! Wave composition: hand-authored scripts first, then procedural waves.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ai::{EnemyPattern, HEADING_DOWN};
use crate::config::SimConfig;
use crate::geometry::Vec2;

/// One enemy placed by a scripted wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedEnemy {
    pub x: f32,
    pub y: f32,
    pub pattern: EnemyPattern,
    /// Overrides the wave-scaled default.
    #[serde(default)]
    pub health: Option<u32>,
    #[serde(default)]
    pub fire_interval_ticks: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveScript {
    pub enemies: Vec<ScriptedEnemy>,
}

/// An enemy the simulation should create when the wave starts.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemySpawn {
    pub position: Vec2,
    pub pattern: EnemyPattern,
    pub health: u32,
    pub score_value: u32,
    pub fire_interval_ticks: Option<u32>,
}

const ROW_SPACING: f32 = 48.0;
const TOP_MARGIN: f32 = 40.0;
const PER_ROW: u32 = 8;

pub fn enemy_count(wave: u32, cfg: &SimConfig) -> u32 {
    cfg.waves.base_count + cfg.waves.count_per_wave * wave.saturating_sub(1)
}

pub fn enemy_health(wave: u32, cfg: &SimConfig) -> u32 {
    cfg.enemies.base_health + cfg.enemies.health_per_wave * wave.saturating_sub(1)
}

/// Enemies for `wave` (1-based). Procedural waves draw jitter from `rng`.
pub fn plan_wave<R: Rng>(wave: u32, cfg: &SimConfig, rng: &mut R) -> Vec<EnemySpawn> {
    let health = enemy_health(wave, cfg);
    let score_value = cfg.enemies.score_value;

    let scripted = (wave as usize)
        .checked_sub(1)
        .and_then(|i| cfg.waves.scripted.get(i));
    if let Some(script) = scripted {
        return script
            .enemies
            .iter()
            .map(|e| EnemySpawn {
                position: Vec2::new(e.x, e.y),
                pattern: e.pattern.clone(),
                health: e.health.unwrap_or(health),
                score_value,
                fire_interval_ticks: e.fire_interval_ticks,
            })
            .collect();
    }

    let count = enemy_count(wave, cfg);
    let per_row = count.clamp(1, PER_ROW);
    let spacing = cfg.arena.width / (per_row as f32 + 1.0);
    let fire_interval = cfg.enemies.fire_interval_ticks;

    (0..count)
        .map(|i| {
            let row = i / per_row;
            let col = i % per_row;
            let jitter = rng.random_range(-0.2..=0.2) * spacing;
            let x = (spacing * (col as f32 + 1.0) + jitter).clamp(0.0, cfg.arena.width);
            let y = (TOP_MARGIN + row as f32 * ROW_SPACING).min(cfg.arena.height / 2.0);
            let (pattern, fires) = procedural_pattern(i + wave, wave, fire_interval);
            EnemySpawn {
                position: Vec2::new(x, y),
                pattern,
                health,
                score_value,
                fire_interval_ticks: (fires && fire_interval > 0).then_some(fire_interval),
            }
        })
        .collect()
}

/// Pattern rotation for procedural waves; later waves move faster.
fn procedural_pattern(index: u32, wave: u32, fire_interval: u32) -> (EnemyPattern, bool) {
    let pace = 1.0 + 0.1 * wave.saturating_sub(1) as f32;
    match index % 4 {
        0 => (
            EnemyPattern::Sine {
                speed: 35.0 * pace,
                amplitude: 60.0,
                frequency: 0.5,
                heading: HEADING_DOWN,
            },
            index % 2 == 0,
        ),
        1 => (
            EnemyPattern::Burst {
                speed: 70.0 * pace,
                segment_ticks: 30,
                heading: HEADING_DOWN,
                swing: 0.6,
            },
            true,
        ),
        2 => (
            EnemyPattern::Homing {
                speed: 60.0 * pace,
                turn_rate: 1.5,
            },
            false,
        ),
        _ => (
            EnemyPattern::Static {
                fire_interval_ticks: fire_interval.max(1),
            },
            true,
        ),
    }
}
