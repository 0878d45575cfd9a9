//! Client input, per-tick merging and anti-cheat validation.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::{AntiCheatConfig, PowerUpConfig, SimConfig};
use crate::geometry::{Arena, Vec2};
use crate::player::{PlayerId, PlayerState};
use crate::powerup::PowerUpKind;

/// Input payload as submitted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFrame {
    /// Desired absolute position.
    pub x: f32,
    pub y: f32,
    pub shoot: bool,
    /// Client clock in milliseconds.
    pub timestamp: u64,
    pub seq: u32,
}

/// An input frame attributed to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub shoot: bool,
    pub timestamp: u64,
    pub seq: u32,
}

impl PlayerInput {
    pub fn new(player_id: impl Into<PlayerId>, frame: InputFrame) -> Self {
        Self {
            player_id: player_id.into(),
            x: frame.x,
            y: frame.y,
            shoot: frame.shoot,
            timestamp: frame.timestamp,
            seq: frame.seq,
        }
    }

    pub fn frame(&self) -> InputFrame {
        InputFrame {
            x: self.x,
            y: self.y,
            shoot: self.shoot,
            timestamp: self.timestamp,
            seq: self.seq,
        }
    }
}

/// All of one player's inputs for a tick folded into one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedInput {
    pub position: Vec2,
    /// OR of every merged shoot flag.
    pub shoot: bool,
    pub timestamp: u64,
    pub seq: u32,
}

#[derive(Debug, Default)]
pub struct MergedInputs {
    pub by_player: BTreeMap<PlayerId, MergedInput>,
    /// Inputs dropped for a sequence number below one already seen.
    pub out_of_order: Vec<(PlayerId, u32)>,
}

/// Fold a tick's inputs in arrival order. The last input wins for position and
/// shoot flags are OR'ed. `last_seq` reports the player's last accepted sequence.
pub fn merge_inputs<F>(inputs: Vec<PlayerInput>, last_seq: F) -> MergedInputs
where
    F: Fn(&str) -> Option<u32>,
{
    let mut out = MergedInputs::default();
    for input in inputs {
        let frame = input.frame();
        let player_id = input.player_id;
        let floor = out
            .by_player
            .get(&player_id)
            .map(|m| m.seq)
            .or_else(|| last_seq(&player_id));
        if floor.is_some_and(|s| frame.seq < s) {
            out.out_of_order.push((player_id, frame.seq));
            continue;
        }
        let shoot = frame.shoot || out.by_player.get(&player_id).is_some_and(|m| m.shoot);
        out.by_player.insert(player_id, MergedInput {
            position: Vec2::new(frame.x, frame.y),
            shoot,
            timestamp: frame.timestamp,
            seq: frame.seq,
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    SpeedExceeded { distance: f32, allowed: f32 },
    FireTooSoon { since_last_ms: u64, cooldown_ms: u64 },
    ClockRegression { last_ms: u64, got_ms: u64 },
    OutOfBounds { x: f32, y: f32 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpeedExceeded { distance, allowed } => {
                write!(f, "moved {distance:.2} units, allowed {allowed:.2}")
            },
            Self::FireTooSoon {
                since_last_ms,
                cooldown_ms,
            } => write!(f, "fired {since_last_ms}ms after last shot (cooldown {cooldown_ms}ms)"),
            Self::ClockRegression { last_ms, got_ms } => {
                write!(f, "client clock went backwards: {got_ms} < {last_ms}")
            },
            Self::OutOfBounds { x, y } => write!(f, "position ({x}, {y}) outside arena"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::SpeedExceeded { .. } => "speed",
            Self::FireTooSoon { .. } => "fireCooldown",
            Self::ClockRegression { .. } => "clock",
            Self::OutOfBounds { .. } => "bounds",
        }
    }
}

/// Anti-cheat bookkeeping for one player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AntiCheatState {
    pub last_input_ms: Option<u64>,
    /// Tick of the last accepted input, or of the join.
    pub last_accept_tick: u64,
    pub last_shot_ms: Option<u64>,
    pub last_seq: Option<u32>,
    /// Ticks of strikes inside the rolling window, oldest first.
    pub strikes: VecDeque<u64>,
    pub total_violations: u64,
    pub flagged: bool,
}

impl AntiCheatState {
    pub fn joined_at(tick: u64) -> Self {
        Self {
            last_accept_tick: tick,
            ..Self::default()
        }
    }

    /// Record a strike at `now`. Returns true the first time the window reaches
    /// the threshold.
    pub fn strike(&mut self, now: u64, cfg: &AntiCheatConfig) -> bool {
        self.total_violations += 1;
        self.strikes.push_back(now);
        while self
            .strikes
            .front()
            .is_some_and(|&t| now.saturating_sub(t) >= cfg.violation_window_ticks)
        {
            self.strikes.pop_front();
        }
        if !self.flagged && self.strikes.len() >= cfg.violation_threshold {
            self.flagged = true;
            return true;
        }
        false
    }
}

/// Outcome of validating one merged input.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted { fired: bool },
    Rejected {
        error: ValidationError,
        /// The player crossed the violation threshold with this strike.
        newly_flagged: bool,
    },
}

/// Checks inputs against physically plausible bounds.
#[derive(Debug, Clone, Copy)]
pub struct InputValidator<'a> {
    anticheat: &'a AntiCheatConfig,
    powerups: &'a PowerUpConfig,
    arena: &'a Arena,
    tick_ms: u64,
}

impl<'a> InputValidator<'a> {
    pub fn new(cfg: &'a SimConfig) -> Self {
        Self {
            anticheat: &cfg.anticheat,
            powerups: &cfg.powerups,
            arena: &cfg.arena,
            tick_ms: cfg.tick_rate_ms,
        }
    }

    /// Pure check against the player's last accepted state.
    pub fn check(&self, player: &PlayerState, input: &MergedInput, now: u64) -> Result<(), ValidationError> {
        let state = &player.anticheat;

        if !self.arena.contains(input.position) {
            return Err(ValidationError::OutOfBounds {
                x: input.position.x,
                y: input.position.y,
            });
        }

        if let Some(last) = state.last_input_ms
            && input.timestamp < last
        {
            return Err(ValidationError::ClockRegression {
                last_ms: last,
                got_ms: input.timestamp,
            });
        }

        let server_ms = now.saturating_sub(state.last_accept_tick) * self.tick_ms
            + self.anticheat.clock_slack_ms;
        let elapsed_ms = match state.last_input_ms {
            Some(last) => (input.timestamp - last).min(server_ms),
            None => server_ms,
        };
        let mut max_speed = self.anticheat.max_speed;
        if player.has_effect(PowerUpKind::SpeedBoost, now) {
            max_speed *= self.powerups.speed_boost_multiplier;
        }
        let allowed = max_speed * elapsed_ms as f32 / 1000.0;
        let distance = player.position.distance(input.position);
        if distance > allowed {
            return Err(ValidationError::SpeedExceeded { distance, allowed });
        }

        if input.shoot
            && let Some(last_shot) = state.last_shot_ms
        {
            let cooldown_ms = self.fire_cooldown_ms(player, now);
            let since_last_ms = input.timestamp.saturating_sub(last_shot);
            if since_last_ms < cooldown_ms {
                return Err(ValidationError::FireTooSoon {
                    since_last_ms,
                    cooldown_ms,
                });
            }
        }

        Ok(())
    }

    fn fire_cooldown_ms(&self, player: &PlayerState, now: u64) -> u64 {
        let base = self.anticheat.fire_cooldown_ms;
        if player.has_effect(PowerUpKind::RapidFire, now) {
            (base as f32 * self.powerups.rapid_fire_multiplier).round() as u64
        } else {
            base
        }
    }

    /// Validate and commit. Accepted inputs move the player and update the last
    /// accepted state; rejections leave it untouched apart from the strike.
    pub fn apply(&self, player: &mut PlayerState, input: &MergedInput, now: u64) -> Verdict {
        match self.check(player, input, now) {
            Ok(()) => {
                let state = &mut player.anticheat;
                state.last_input_ms = Some(input.timestamp);
                state.last_accept_tick = now;
                state.last_seq = Some(input.seq);
                if input.shoot {
                    state.last_shot_ms = Some(input.timestamp);
                }
                player.position = input.position;
                Verdict::Accepted { fired: input.shoot }
            },
            Err(error) => {
                let newly_flagged = player.anticheat.strike(now, self.anticheat);
                Verdict::Rejected {
                    error,
                    newly_flagged,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(x: f32, y: f32, shoot: bool, timestamp: u64, seq: u32) -> InputFrame {
        InputFrame {
            x,
            y,
            shoot,
            timestamp,
            seq,
        }
    }

    fn merged(x: f32, y: f32, shoot: bool, timestamp: u64) -> MergedInput {
        MergedInput {
            position: Vec2::new(x, y),
            shoot,
            timestamp,
            seq: 0,
        }
    }

    /// Player at (400, 500) whose last accepted input was at t=1000ms on tick 10.
    fn primed_player() -> PlayerState {
        let mut p = PlayerState::new("p1".into(), 0, Vec2::new(400.0, 500.0), 100);
        p.anticheat.last_input_ms = Some(1000);
        p.anticheat.last_accept_tick = 10;
        p
    }

    #[test]
    fn merge_last_position_wins_and_shoot_is_ored() {
        let inputs = vec![
            PlayerInput::new("a", frame(10.0, 10.0, true, 100, 1)),
            PlayerInput::new("b", frame(50.0, 50.0, false, 100, 1)),
            PlayerInput::new("a", frame(12.0, 11.0, false, 110, 2)),
        ];
        let out = merge_inputs(inputs, |_| None);
        let a = out.by_player["a"];
        assert_eq!(a.position, Vec2::new(12.0, 11.0));
        assert!(a.shoot);
        assert_eq!(a.seq, 2);
        assert!(!out.by_player["b"].shoot);
    }

    #[test]
    fn merge_drops_out_of_order_sequences() {
        let inputs = vec![
            PlayerInput::new("a", frame(10.0, 10.0, false, 100, 5)),
            PlayerInput::new("a", frame(99.0, 99.0, true, 90, 4)),
            PlayerInput::new("b", frame(1.0, 1.0, false, 100, 2)),
        ];
        let out = merge_inputs(inputs, |id| (id == "b").then_some(3));
        assert_eq!(out.by_player["a"].position, Vec2::new(10.0, 10.0));
        assert!(!out.by_player["a"].shoot);
        assert!(!out.by_player.contains_key("b"));
        assert_eq!(out.out_of_order, vec![("a".into(), 4), ("b".into(), 2)]);
    }

    #[test]
    fn merge_accepts_equal_sequence() {
        let inputs = vec![
            PlayerInput::new("a", frame(10.0, 10.0, false, 100, 5)),
            PlayerInput::new("a", frame(11.0, 10.0, false, 100, 5)),
        ];
        let out = merge_inputs(inputs, |_| Some(5));
        assert_eq!(out.by_player["a"].position, Vec2::new(11.0, 10.0));
    }

    #[test]
    fn plausible_move_is_accepted_and_committed() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let mut p = primed_player();
        // 100ms at 300 u/s allows 30 units; server time is 3 ticks (99ms) + slack.
        let verdict = v.apply(&mut p, &merged(420.0, 500.0, true, 1100), 13);
        assert_eq!(verdict, Verdict::Accepted { fired: true });
        assert_eq!(p.position, Vec2::new(420.0, 500.0));
        assert_eq!(p.anticheat.last_shot_ms, Some(1100));
        assert_eq!(p.anticheat.last_accept_tick, 13);
    }

    #[test]
    fn overspeed_is_rejected_and_position_kept() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let mut p = primed_player();
        let verdict = v.apply(&mut p, &merged(480.0, 500.0, false, 1100), 13);
        assert!(matches!(verdict, Verdict::Rejected {
            error: ValidationError::SpeedExceeded { .. },
            ..
        }));
        assert_eq!(p.position, Vec2::new(400.0, 500.0));
        assert_eq!(p.anticheat.total_violations, 1);
    }

    #[test]
    fn client_clock_cannot_buy_extra_distance() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let p = primed_player();
        // Claims 10s elapsed but only one tick passed on the server.
        let err = v.check(&p, &merged(700.0, 500.0, false, 11_000), 11).unwrap_err();
        assert!(matches!(err, ValidationError::SpeedExceeded { .. }));
    }

    #[test]
    fn clock_regression_is_a_violation() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let p = primed_player();
        let err = v.check(&p, &merged(400.0, 500.0, false, 999), 12).unwrap_err();
        assert_eq!(err, ValidationError::ClockRegression {
            last_ms: 1000,
            got_ms: 999
        });
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let p = primed_player();
        let err = v.check(&p, &merged(-1.0, 500.0, false, 1100), 40).unwrap_err();
        assert_eq!(err.reason(), "bounds");
    }

    #[test]
    fn rapid_fire_shortens_cooldown() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let mut p = primed_player();
        p.anticheat.last_shot_ms = Some(1000);
        let shot = merged(400.0, 500.0, true, 1150);
        assert!(v.check(&p, &shot, 20).is_err());
        crate::powerup::apply_pickup(&mut p.effects, PowerUpKind::RapidFire, 15, &cfg.powerups);
        assert!(v.check(&p, &shot, 20).is_ok());
    }

    #[test]
    fn speed_boost_raises_limit() {
        let cfg = SimConfig::default();
        let v = InputValidator::new(&cfg);
        let mut p = primed_player();
        let fast = merged(440.0, 500.0, false, 1100);
        assert!(v.check(&p, &fast, 13).is_err());
        crate::powerup::apply_pickup(&mut p.effects, PowerUpKind::SpeedBoost, 12, &cfg.powerups);
        assert!(v.check(&p, &fast, 13).is_ok());
    }

    #[test]
    fn flag_fires_once_when_window_reaches_threshold() {
        let cfg = AntiCheatConfig {
            violation_threshold: 3,
            violation_window_ticks: 10,
            ..AntiCheatConfig::default()
        };
        let mut s = AntiCheatState::default();
        assert!(!s.strike(1, &cfg));
        assert!(!s.strike(2, &cfg));
        assert!(s.strike(3, &cfg));
        assert!(!s.strike(4, &cfg), "flag is raised only once");
        assert!(s.flagged);
    }

    #[test]
    fn strikes_outside_window_do_not_count() {
        let cfg = AntiCheatConfig {
            violation_threshold: 3,
            violation_window_ticks: 10,
            ..AntiCheatConfig::default()
        };
        let mut s = AntiCheatState::default();
        s.strike(0, &cfg);
        s.strike(5, &cfg);
        assert!(!s.strike(12, &cfg), "tick 0 fell out of the window");
        assert_eq!(s.strikes.len(), 2);
        assert_eq!(s.total_violations, 3);
    }

    #[test]
    fn input_json_uses_camel_case() {
        let json = r#"{"playerId":"p1","x":1.0,"y":2.0,"shoot":true,"timestamp":5,"seq":9}"#;
        let input: PlayerInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.player_id, "p1");
        assert_eq!(input.seq, 9);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_overspeed_is_rejected(
                elapsed_ms in 1u64..200,
                excess in 0.001f32..1.0,
                angle in 0.0f32..std::f32::consts::TAU,
            ) {
                let cfg = SimConfig::default();
                let v = InputValidator::new(&cfg);
                let mut p = primed_player();
                p.position = Vec2::new(400.0, 300.0);
                // Plenty of server time so the client clock is the bound.
                let now = 10 + 100;
                let allowed = cfg.anticheat.max_speed * elapsed_ms as f32 / 1000.0;
                let dist = allowed * (1.0 + excess) + 0.01;
                let target = p.position + Vec2::from_angle(angle) * dist;
                let input = merged(target.x, target.y, false, 1000 + elapsed_ms);
                let rejected = matches!(
                    v.check(&p, &input, now),
                    Err(ValidationError::SpeedExceeded { .. })
                );
                prop_assert!(rejected, "moved {} in {}ms", dist, elapsed_ms);
            }

            #[test]
            fn any_shot_inside_cooldown_is_rejected(gap in 0u64..200) {
                let cfg = SimConfig::default();
                let v = InputValidator::new(&cfg);
                let mut p = primed_player();
                p.anticheat.last_shot_ms = Some(1000);
                let input = merged(400.0, 500.0, true, 1000 + gap);
                let rejected = matches!(
                    v.check(&p, &input, 100),
                    Err(ValidationError::FireTooSoon { .. })
                );
                prop_assert!(rejected);
            }

            #[test]
            fn moves_within_limit_are_accepted(
                elapsed_ms in 50u64..500,
                frac in 0.0f32..0.99,
            ) {
                let cfg = SimConfig::default();
                let v = InputValidator::new(&cfg);
                let p = primed_player();
                let allowed = cfg.anticheat.max_speed * elapsed_ms as f32 / 1000.0;
                let input = merged(400.0 - allowed * frac, 500.0, false, 1000 + elapsed_ms);
                prop_assert!(v.check(&p, &input, 100).is_ok());
            }
        }
    }
}
