use serde::{Deserialize, Serialize};

use crate::player::PlayerState;

/// Kills required for [`Achievement::Exterminator`].
pub const EXTERMINATOR_KILLS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Achievement {
    /// First enemy kill in the room.
    FirstBlood,
    Exterminator,
    /// Survived a whole wave without taking damage.
    Untouchable,
}

impl Achievement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Achievement::FirstBlood => "firstBlood",
            Achievement::Exterminator => "exterminator",
            Achievement::Untouchable => "untouchable",
        }
    }
}

/// Unlock `achievement` for `player`. Returns true only the first time.
pub fn unlock(player: &mut PlayerState, achievement: Achievement) -> bool {
    player.achievements.insert(achievement)
}

/// Achievements earned by a kill. `room_first_kill` is true for the first kill in the room.
pub fn on_kill(player: &mut PlayerState, room_first_kill: bool) -> Vec<Achievement> {
    let mut unlocked = Vec::new();
    if room_first_kill && unlock(player, Achievement::FirstBlood) {
        unlocked.push(Achievement::FirstBlood);
    }
    if player.kills >= EXTERMINATOR_KILLS && unlock(player, Achievement::Exterminator) {
        unlocked.push(Achievement::Exterminator);
    }
    unlocked
}

/// Checked when a wave is cleared.
pub fn on_wave_cleared(player: &mut PlayerState) -> Option<Achievement> {
    (player.is_alive()
        && player.damage_taken_this_wave == 0
        && unlock(player, Achievement::Untouchable))
    .then_some(Achievement::Untouchable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2;

    fn player() -> PlayerState {
        PlayerState::new("p".into(), 0, Vec2::ZERO, 100)
    }

    #[test]
    fn first_blood_unlocks_once() {
        let mut p = player();
        p.kills = 1;
        assert_eq!(on_kill(&mut p, true), vec![Achievement::FirstBlood]);
        p.kills = 2;
        assert!(on_kill(&mut p, true).is_empty());
    }

    #[test]
    fn exterminator_at_threshold() {
        let mut p = player();
        p.kills = EXTERMINATOR_KILLS - 1;
        assert!(on_kill(&mut p, false).is_empty());
        p.kills = EXTERMINATOR_KILLS;
        assert_eq!(on_kill(&mut p, false), vec![Achievement::Exterminator]);
    }

    #[test]
    fn untouchable_requires_no_damage() {
        let mut hurt = player();
        hurt.take_damage(5, 0);
        assert_eq!(on_wave_cleared(&mut hurt), None);

        let mut clean = player();
        assert_eq!(on_wave_cleared(&mut clean), Some(Achievement::Untouchable));
        assert_eq!(on_wave_cleared(&mut clean), None);
    }
}
