pub mod achievements;
pub mod ai;
pub mod collision;
pub mod config;
pub mod entity;
pub mod events;
pub mod geometry;
pub mod input;
pub mod player;
pub mod powerup;
pub mod protocol;
pub mod room;
pub mod sim;
pub mod snapshot;
pub mod wave;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::config::SimConfig;
    use crate::input::{InputFrame, PlayerInput};
    use crate::sim::{RoomSim, SimCommand, TickOutput};

    /// Default rules with a fixed seed and no random power-ups.
    pub fn quiet_config() -> SimConfig {
        let mut cfg = SimConfig {
            seed: Some(7),
            ..SimConfig::default()
        };
        cfg.powerups.spawn_rate = 0.0;
        cfg
    }

    /// Join `p1` and `p2` in one tick. With the default rules the room becomes ACTIVE.
    pub fn join_both(sim: &mut RoomSim) -> TickOutput {
        sim.step(
            vec![
                SimCommand::Join("p1".to_string()),
                SimCommand::Join("p2".to_string()),
            ],
            vec![],
        )
    }

    pub fn frame(x: f32, y: f32, shoot: bool, timestamp: u64, seq: u32) -> InputFrame {
        InputFrame {
            x,
            y,
            shoot,
            timestamp,
            seq,
        }
    }

    pub fn input(player: &str, x: f32, y: f32, shoot: bool, timestamp: u64, seq: u32) -> PlayerInput {
        PlayerInput::new(player, frame(x, y, shoot, timestamp, seq))
    }

    /// Step `n` ticks with no commands or inputs, returning every output.
    pub fn run_idle(sim: &mut RoomSim, n: usize) -> Vec<TickOutput> {
        (0..n).map(|_| sim.step(vec![], vec![])).collect()
    }
}
