//! Enemy motion patterns.
//!
//! Every pattern is a pure function of the enemy's age in ticks, its pattern
//! parameters and the nearest living player. Evaluation never mutates state;
//! the tick integrates the returned velocity.

use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;

/// Heading that points straight down the arena.
pub const HEADING_DOWN: f32 = PI / 2.0;

/// Motion pattern attached to an enemy. Unrecognized `kind` tags deserialize
/// to [`EnemyPattern::Unknown`] and fail at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EnemyPattern {
    /// Travels along `heading` while oscillating across it.
    #[serde(rename_all = "camelCase")]
    Sine {
        speed: f32,
        amplitude: f32,
        /// Oscillations per second.
        frequency: f32,
        heading: f32,
    },
    /// Steers toward the nearest player, turning at most `turn_rate` rad/s.
    #[serde(rename_all = "camelCase")]
    Homing { speed: f32, turn_rate: f32 },
    /// Holds position and fires every `fire_interval_ticks`.
    #[serde(rename_all = "camelCase")]
    Static { fire_interval_ticks: u32 },
    /// Straight segments of `segment_ticks`, alternating `heading ± swing`.
    #[serde(rename_all = "camelCase")]
    Burst {
        speed: f32,
        segment_ticks: u32,
        heading: f32,
        swing: f32,
    },
    #[serde(other)]
    Unknown,
}

impl EnemyPattern {
    pub fn name(&self) -> &'static str {
        match self {
            EnemyPattern::Sine { .. } => "sine",
            EnemyPattern::Homing { .. } => "homing",
            EnemyPattern::Static { .. } => "static",
            EnemyPattern::Burst { .. } => "burst",
            EnemyPattern::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AiError {
    UnknownPattern,
    InvalidParameter { name: &'static str, value: f32 },
    CorruptState(&'static str),
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPattern => write!(f, "unknown motion pattern"),
            Self::InvalidParameter { name, value } => {
                write!(f, "invalid pattern parameter {name}={value}")
            },
            Self::CorruptState(what) => write!(f, "corrupt enemy state: {what}"),
        }
    }
}

impl std::error::Error for AiError {}

/// Read-only view of an enemy for evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EnemyView<'a> {
    pub pattern: &'a EnemyPattern,
    pub position: Vec2,
    pub velocity: Vec2,
    pub age_ticks: u64,
    /// Fire cadence for moving patterns; `Static` carries its own.
    pub fire_interval_ticks: Option<u32>,
}

/// What the enemy wants to do this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiIntent {
    pub velocity: Vec2,
    /// Unit direction of a shot fired this tick.
    pub fire: Option<Vec2>,
}

/// Evaluate one enemy. `dt` is the tick duration in seconds.
pub fn evaluate(enemy: &EnemyView<'_>, nearest_player: Option<Vec2>, dt: f32) -> Result<AiIntent, AiError> {
    if !enemy.position.is_finite() {
        return Err(AiError::CorruptState("position is not finite"));
    }
    if !enemy.velocity.is_finite() {
        return Err(AiError::CorruptState("velocity is not finite"));
    }

    let t = enemy.age_ticks as f32 * dt;
    let (velocity, fire_interval) = match *enemy.pattern {
        EnemyPattern::Sine {
            speed,
            amplitude,
            frequency,
            heading,
        } => {
            check("speed", speed, speed >= 0.0)?;
            check("amplitude", amplitude, true)?;
            check("frequency", frequency, frequency >= 0.0)?;
            check("heading", heading, true)?;
            (sine_velocity(speed, amplitude, frequency, heading, t), enemy.fire_interval_ticks)
        },
        EnemyPattern::Homing { speed, turn_rate } => {
            check("speed", speed, speed >= 0.0)?;
            check("turn_rate", turn_rate, turn_rate >= 0.0)?;
            let v = homing_velocity(
                enemy.position,
                enemy.velocity,
                nearest_player,
                speed,
                turn_rate * dt,
            );
            (v, enemy.fire_interval_ticks)
        },
        EnemyPattern::Static {
            fire_interval_ticks,
        } => {
            if fire_interval_ticks == 0 {
                return Err(AiError::InvalidParameter {
                    name: "fire_interval_ticks",
                    value: 0.0,
                });
            }
            (Vec2::ZERO, Some(fire_interval_ticks))
        },
        EnemyPattern::Burst {
            speed,
            segment_ticks,
            heading,
            swing,
        } => {
            check("speed", speed, speed >= 0.0)?;
            check("heading", heading, true)?;
            check("swing", swing, true)?;
            if segment_ticks == 0 {
                return Err(AiError::InvalidParameter {
                    name: "segment_ticks",
                    value: 0.0,
                });
            }
            (
                burst_velocity(speed, segment_ticks, heading, swing, enemy.age_ticks),
                enemy.fire_interval_ticks,
            )
        },
        EnemyPattern::Unknown => return Err(AiError::UnknownPattern),
    };

    if !velocity.is_finite() {
        return Err(AiError::CorruptState("velocity diverged"));
    }

    let fire = match fire_interval {
        Some(interval) if interval > 0 && enemy.age_ticks > 0 && enemy.age_ticks % u64::from(interval) == 0 => {
            let dir = nearest_player
                .and_then(|p| (p - enemy.position).normalized())
                .unwrap_or(Vec2::new(0.0, 1.0));
            Some(dir)
        },
        _ => None,
    };

    Ok(AiIntent { velocity, fire })
}

fn check(name: &'static str, value: f32, ok: bool) -> Result<(), AiError> {
    if value.is_finite() && ok {
        Ok(())
    } else {
        Err(AiError::InvalidParameter { name, value })
    }
}

/// Derivative of `origin + heading * speed * t + perp * amplitude * sin(ωt)`.
fn sine_velocity(speed: f32, amplitude: f32, frequency: f32, heading: f32, t: f32) -> Vec2 {
    let dir = Vec2::from_angle(heading);
    let omega = TAU * frequency;
    dir * speed + dir.perp() * (amplitude * omega * (omega * t).cos())
}

fn homing_velocity(
    position: Vec2,
    velocity: Vec2,
    target: Option<Vec2>,
    speed: f32,
    max_turn: f32,
) -> Vec2 {
    let current = velocity.normalized().map_or(HEADING_DOWN, Vec2::angle);
    let Some(desired) = target.and_then(|p| (p - position).normalized()) else {
        return Vec2::from_angle(current) * speed;
    };
    let diff = wrap_angle(desired.angle() - current);
    let turned = current + diff.clamp(-max_turn, max_turn);
    Vec2::from_angle(turned) * speed
}

fn burst_velocity(speed: f32, segment_ticks: u32, heading: f32, swing: f32, age_ticks: u64) -> Vec2 {
    let segment = age_ticks / u64::from(segment_ticks);
    let angle = if segment % 2 == 0 {
        heading + swing
    } else {
        heading - swing
    };
    Vec2::from_angle(angle) * speed
}

/// Wrap to `(-π, π]`.
fn wrap_angle(a: f32) -> f32 {
    let mut a = a % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Position of the nearest candidate; ties keep the earlier entry.
/// Callers pass candidates in ascending player id order.
pub fn nearest(from: Vec2, candidates: &[Vec2]) -> Option<Vec2> {
    let mut best: Option<(f32, Vec2)> = None;
    for &p in candidates {
        let d = from.distance_sq(p);
        if best.is_none_or(|(bd, _)| d < bd) {
            best = Some((d, p));
        }
    }
    best.map(|(_, p)| p)
}
