//! Deterministic per-room simulation.
//!
//! [`RoomSim::step`] advances exactly one tick. It is synchronous and has no
//! side effects besides logging, so the same ordered commands and inputs with
//! the same seed always produce the same snapshots.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::achievements;
use crate::ai::{self, EnemyView};
use crate::collision::{Body, CollisionSet, detect_by};
use crate::config::SimConfig;
use crate::entity::{Enemy, Entity, EntityId, EntityIds, EntityKind, Shooter};
use crate::events::{GameEvent, Outcome, Transition};
use crate::geometry::Vec2;
use crate::input::{AntiCheatState, InputValidator, PlayerInput, Verdict, merge_inputs};
use crate::player::{PlayerId, PlayerState, spawn_position};
use crate::powerup::{self, PowerUpKind, apply_pickup, expire_effects};
use crate::room::{RoomId, RoomState};
use crate::snapshot::{EntityView, PlayerView, Snapshot};
use crate::wave::plan_wave;

/// Membership change applied at the start of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Join(PlayerId),
    Leave(PlayerId),
}

/// Everything one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub snapshot: Snapshot,
    pub events: Vec<GameEvent>,
}

pub struct RoomSim {
    room_id: RoomId,
    cfg: SimConfig,
    state: RoomState,
    tick: u64,
    wave: u32,
    wave_pending: bool,
    players: BTreeMap<PlayerId, PlayerState>,
    entities: BTreeMap<EntityId, Entity>,
    ids: EntityIds,
    rng: StdRng,
    empty_ticks: u64,
    first_kill_done: bool,
    outcome: Option<Outcome>,
}

/// Stable 64-bit FNV-1a, used to derive a seed from the room id.
fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

impl RoomSim {
    pub fn new(room_id: impl Into<RoomId>, cfg: SimConfig) -> Self {
        let room_id = room_id.into();
        let seed = cfg.seed.unwrap_or_else(|| fnv1a(&room_id));
        Self {
            room_id,
            cfg,
            state: RoomState::Waiting,
            tick: 0,
            wave: 0,
            wave_pending: false,
            players: BTreeMap::new(),
            entities: BTreeMap::new(),
            ids: EntityIds::default(),
            rng: StdRng::seed_from_u64(seed),
            empty_ticks: 0,
            first_kill_done: false,
            outcome: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn wave(&self) -> u32 {
        self.wave
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Consecutive ticks, up to and including the last one, with no members.
    pub fn empty_ticks(&self) -> u64 {
        self.empty_ticks
    }

    pub fn member_count(&self) -> usize {
        self.players.len()
    }

    pub fn members(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.keys()
    }

    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn enemy_count(&self) -> usize {
        self.entities
            .values()
            .filter(|e| matches!(e.kind, EntityKind::Enemy(_)))
            .count()
    }

    /// Advance one tick.
    pub fn step(&mut self, commands: Vec<SimCommand>, inputs: Vec<PlayerInput>) -> TickOutput {
        self.tick += 1;
        let mut transitions = Vec::new();

        if self.state != RoomState::Ended {
            self.apply_commands(commands, &mut transitions);

            if self.state == RoomState::Active && self.wave_pending {
                self.start_next_wave();
            }

            let shooters = self.apply_inputs(inputs, &mut transitions);

            if self.state == RoomState::Active {
                self.spawn_player_bullets(&shooters);
                let shots = self.run_ai();
                self.spawn_enemy_bullets(shots);
                self.integrate();
                self.resolve_collisions(&mut transitions);
                self.run_powerups();
                self.check_terminal(&mut transitions);
            }
        }

        if self.players.is_empty() {
            self.empty_ticks += 1;
        } else {
            self.empty_ticks = 0;
        }

        let events = transitions
            .into_iter()
            .map(|t| t.into_event(&self.room_id, self.tick))
            .collect();
        TickOutput {
            snapshot: self.snapshot(),
            events,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            room_id: self.room_id.clone(),
            tick: self.tick,
            wave: self.wave,
            state: self.state,
            players: self.players.values().map(PlayerView::from).collect(),
            entities: self.entities.values().map(EntityView::from).collect(),
        }
    }

    fn apply_commands(&mut self, commands: Vec<SimCommand>, transitions: &mut Vec<Transition>) {
        for command in commands {
            match command {
                SimCommand::Join(player_id) => self.join(player_id, transitions),
                SimCommand::Leave(player_id) => {
                    if self.players.remove(&player_id).is_some() {
                        tracing::info!(room = %self.room_id, tick = self.tick, %player_id, "Player left");
                        transitions.push(Transition::PlayerLeft {
                            player_id,
                            members: self.players.len(),
                        });
                    }
                },
            }
        }
    }

    fn join(&mut self, player_id: PlayerId, transitions: &mut Vec<Transition>) {
        if self.players.contains_key(&player_id) {
            return;
        }
        let max = self.cfg.room.max_players;
        if self.players.len() >= max {
            tracing::warn!(room = %self.room_id, %player_id, max, "Join ignored, room full");
            return;
        }
        let slot = (0..max)
            .find(|s| self.players.values().all(|p| p.slot != *s))
            .unwrap_or(0);
        let arena = self.cfg.arena;
        let position = spawn_position(slot, max, arena.width, arena.height, self.cfg.player.spawn_margin);
        let mut player = PlayerState::new(player_id.clone(), slot, position, self.cfg.player.max_health);
        player.anticheat = AntiCheatState::joined_at(self.tick);
        self.players.insert(player_id.clone(), player);
        tracing::info!(room = %self.room_id, tick = self.tick, %player_id, slot, "Player joined");
        transitions.push(Transition::PlayerJoined {
            player_id,
            members: self.players.len(),
        });

        if self.state == RoomState::Waiting && self.players.len() >= self.cfg.room.min_players {
            self.state = RoomState::Active;
            self.wave_pending = true;
            tracing::info!(room = %self.room_id, tick = self.tick, "Room active");
        }
    }

    fn start_next_wave(&mut self) {
        self.wave_pending = false;
        self.wave += 1;
        for p in self.players.values_mut() {
            p.damage_taken_this_wave = 0;
        }
        let spawns = plan_wave(self.wave, &self.cfg, &mut self.rng);
        let half = self.cfg.enemies.half_size;
        for spawn in spawns {
            let id = self.ids.alloc();
            self.entities.insert(id, Entity {
                id,
                kind: EntityKind::Enemy(Enemy {
                    pattern: spawn.pattern,
                    health: spawn.health,
                    score_value: spawn.score_value,
                    fire_interval_ticks: spawn.fire_interval_ticks,
                }),
                position: spawn.position,
                velocity: Vec2::ZERO,
                half_size: half,
                spawn_tick: self.tick,
                expires_at: None,
            });
        }
        tracing::info!(
            room = %self.room_id,
            tick = self.tick,
            wave = self.wave,
            enemies = self.enemy_count(),
            "Wave started"
        );
    }

    /// Validate and apply this tick's inputs. Returns the players whose shot was accepted.
    fn apply_inputs(&mut self, inputs: Vec<PlayerInput>, transitions: &mut Vec<Transition>) -> Vec<PlayerId> {
        let players = &self.players;
        let merged = merge_inputs(inputs, |id| players.get(id).and_then(|p| p.anticheat.last_seq));
        for (player_id, seq) in &merged.out_of_order {
            tracing::debug!(room = %self.room_id, tick = self.tick, %player_id, seq, "Dropped out-of-order input");
        }

        let validator = InputValidator::new(&self.cfg);
        let mut shooters = Vec::new();
        for (player_id, input) in merged.by_player {
            let Some(player) = self.players.get_mut(&player_id) else {
                tracing::debug!(room = %self.room_id, %player_id, "Input from non-member ignored");
                continue;
            };
            if !player.is_alive() {
                continue;
            }
            match validator.apply(player, &input, self.tick) {
                Verdict::Accepted { fired } => {
                    if fired {
                        shooters.push(player_id);
                    }
                },
                Verdict::Rejected {
                    error,
                    newly_flagged,
                } => {
                    tracing::debug!(
                        room = %self.room_id,
                        tick = self.tick,
                        %player_id,
                        reason = error.reason(),
                        error = %error,
                        "Rejected input"
                    );
                    if newly_flagged {
                        let violations = player.anticheat.strikes.len();
                        tracing::warn!(room = %self.room_id, tick = self.tick, %player_id, violations, "Player flagged");
                        transitions.push(Transition::PlayerFlagged {
                            player_id,
                            violations,
                        });
                    }
                },
            }
        }
        shooters
    }

    fn spawn_player_bullets(&mut self, shooters: &[PlayerId]) {
        let b = &self.cfg.bullets;
        let offset = self.cfg.player.half_size;
        for player_id in shooters {
            let Some(player) = self.players.get(player_id) else {
                continue;
            };
            let id = self.ids.alloc();
            self.entities.insert(id, Entity {
                id,
                kind: EntityKind::Bullet {
                    owner: Shooter::Player(player_id.clone()),
                    damage: b.player_damage,
                },
                position: player.position - Vec2::new(0.0, offset),
                velocity: Vec2::new(0.0, -b.player_speed),
                half_size: b.half_size,
                spawn_tick: self.tick,
                expires_at: Some(self.tick + b.ttl_ticks),
            });
        }
    }

    /// Evaluate every enemy in id order. Enemies whose pattern fails are removed.
    /// Returns `(shooter, origin, direction)` for each shot fired.
    fn run_ai(&mut self) -> Vec<(EntityId, Vec2, Vec2)> {
        let targets: Vec<Vec2> = self
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.position)
            .collect();
        let dt = self.cfg.dt();
        let now = self.tick;
        let mut shots = Vec::new();
        let mut failed = Vec::new();

        for entity in self.entities.values_mut() {
            let EntityKind::Enemy(enemy) = &entity.kind else {
                continue;
            };
            let view = EnemyView {
                pattern: &enemy.pattern,
                position: entity.position,
                velocity: entity.velocity,
                age_ticks: entity.age(now),
                fire_interval_ticks: enemy.fire_interval_ticks,
            };
            match ai::evaluate(&view, ai::nearest(entity.position, &targets), dt) {
                Ok(intent) => {
                    entity.velocity = intent.velocity;
                    if let Some(dir) = intent.fire {
                        shots.push((entity.id, entity.position, dir));
                    }
                },
                Err(e) => failed.push((entity.id, e)),
            }
        }

        for (id, error) in failed {
            self.entities.remove(&id);
            tracing::warn!(room = %self.room_id, tick = now, entity_id = id, error = %error, "Removed enemy with invalid pattern");
        }
        shots
    }

    fn spawn_enemy_bullets(&mut self, shots: Vec<(EntityId, Vec2, Vec2)>) {
        let b = &self.cfg.bullets;
        for (shooter, origin, dir) in shots {
            let id = self.ids.alloc();
            self.entities.insert(id, Entity {
                id,
                kind: EntityKind::Bullet {
                    owner: Shooter::Enemy(shooter),
                    damage: b.enemy_damage,
                },
                position: origin,
                velocity: dir * b.enemy_speed,
                half_size: b.half_size,
                spawn_tick: self.tick,
                expires_at: Some(self.tick + b.ttl_ticks),
            });
        }
    }

    /// Euler step for every entity, then drop anything expired or gone.
    fn integrate(&mut self) {
        let dt = self.cfg.dt();
        let arena = self.cfg.arena;
        let now = self.tick;
        let mut gone = Vec::new();

        for entity in self.entities.values_mut() {
            entity.position += entity.velocity * dt;
            if !entity.position.is_finite() {
                tracing::warn!(room = %self.room_id, tick = now, entity_id = entity.id, kind = entity.kind_name(), "Removed entity with non-finite position");
                gone.push(entity.id);
                continue;
            }
            match entity.kind {
                EntityKind::Enemy(_) => {
                    let h = entity.half_size;
                    entity.position.x = entity.position.x.clamp(0.0, arena.width);
                    if entity.position.y > arena.height + h {
                        entity.position.y = -h;
                    } else if entity.position.y < -h {
                        entity.position.y = arena.height + h;
                    }
                },
                EntityKind::Bullet { .. } => {
                    if arena.is_far_outside(entity.position, entity.half_size * 2.0) {
                        gone.push(entity.id);
                        continue;
                    }
                },
                EntityKind::PowerUp(_) => {
                    if entity.position.y > arena.height + entity.half_size {
                        gone.push(entity.id);
                        continue;
                    }
                },
            }
            if entity.is_expired(now) {
                gone.push(entity.id);
            }
        }

        for id in gone {
            self.entities.remove(&id);
        }
    }

    fn resolve_collisions(&mut self, transitions: &mut Vec<Transition>) {
        let now = self.tick;
        let mut player_bullets = Vec::new();
        let mut enemy_bullets = Vec::new();
        let mut enemies = Vec::new();
        let mut powerups = Vec::new();
        for e in self.entities.values() {
            let body = Body::new(e.id, e.bounds());
            match e.kind {
                EntityKind::Bullet {
                    owner: Shooter::Player(_),
                    ..
                } => player_bullets.push(body),
                EntityKind::Bullet {
                    owner: Shooter::Enemy(_),
                    ..
                } => enemy_bullets.push(body),
                EntityKind::Enemy(_) => enemies.push(body),
                EntityKind::PowerUp(_) => powerups.push(body),
            }
        }
        let half = self.cfg.player.half_size;
        let players: Vec<Body<PlayerId>> = self
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| Body::new(p.id.clone(), p.bounds(half)))
            .collect();

        let contacts = detect_by(
            &CollisionSet {
                player_bullets: &player_bullets,
                enemy_bullets: &enemy_bullets,
                enemies: &enemies,
                players: &players,
                powerups: &powerups,
            },
            self.cfg.collision.shape,
            self.cfg.collision.broad_phase,
        );
        if contacts.is_empty() {
            return;
        }

        for hit in contacts.enemy_hits {
            let target = hit.targets.iter().copied().find(|id| {
                self.entities
                    .get(id)
                    .and_then(Entity::as_enemy)
                    .is_some_and(|e| e.health > 0)
            });
            let Some(target) = target else {
                continue;
            };
            let Some(EntityKind::Bullet {
                owner: Shooter::Player(shooter),
                damage,
            }) = self.entities.remove(&hit.bullet).map(|b| b.kind)
            else {
                continue;
            };
            self.damage_enemy(target, damage, &shooter, transitions);
        }

        for hit in contacts.player_hits {
            let target = hit
                .targets
                .iter()
                .find(|id| self.players.get(*id).is_some_and(PlayerState::is_alive));
            let Some(target) = target else {
                continue;
            };
            let Some(EntityKind::Bullet { damage, .. }) =
                self.entities.remove(&hit.bullet).map(|b| b.kind)
            else {
                continue;
            };
            if let Some(player) = self.players.get_mut(target) {
                player.take_damage(damage, now);
            }
        }

        let contact_damage = self.cfg.enemies.contact_damage;
        for ram in contacts.rams {
            if !self.entities.contains_key(&ram.body) {
                continue;
            }
            let target = ram
                .players
                .iter()
                .find(|id| self.players.get(*id).is_some_and(PlayerState::is_alive));
            let Some(target) = target else {
                continue;
            };
            self.entities.remove(&ram.body);
            if let Some(player) = self.players.get_mut(target) {
                player.take_damage(contact_damage, now);
            }
        }

        for pickup in contacts.pickups {
            let target = pickup
                .players
                .iter()
                .find(|id| self.players.get(*id).is_some_and(PlayerState::is_alive));
            let Some(target) = target else {
                continue;
            };
            let Some(EntityKind::PowerUp(kind)) = self.entities.remove(&pickup.body).map(|e| e.kind)
            else {
                continue;
            };
            if let Some(player) = self.players.get_mut(target) {
                let expires_at = apply_pickup(&mut player.effects, kind, now, &self.cfg.powerups);
                tracing::debug!(room = %self.room_id, tick = now, player_id = %target, kind = kind.as_str(), expires_at, "Power-up picked up");
            }
        }
    }

    fn damage_enemy(
        &mut self,
        target: EntityId,
        damage: u32,
        shooter: &PlayerId,
        transitions: &mut Vec<Transition>,
    ) {
        let Some(EntityKind::Enemy(enemy)) = self.entities.get_mut(&target).map(|e| &mut e.kind) else {
            return;
        };
        enemy.health = enemy.health.saturating_sub(damage);
        if enemy.health > 0 {
            return;
        }
        let score_value = enemy.score_value;
        self.entities.remove(&target);

        // Credit goes to the shooter if they are still in the room.
        let Some(player) = self.players.get_mut(shooter) else {
            return;
        };
        player.score += u64::from(score_value);
        player.kills += 1;
        let room_first_kill = !self.first_kill_done;
        self.first_kill_done = true;
        for achievement in achievements::on_kill(player, room_first_kill) {
            transitions.push(Transition::AchievementUnlocked {
                player_id: shooter.clone(),
                achievement,
            });
        }
    }

    fn run_powerups(&mut self) {
        let now = self.tick;
        for player in self.players.values_mut() {
            for kind in expire_effects(&mut player.effects, now) {
                tracing::debug!(room = %self.room_id, tick = now, player_id = %player.id, kind = kind.as_str(), "Effect expired");
            }
        }

        let active = self
            .entities
            .values()
            .filter(|e| matches!(e.kind, EntityKind::PowerUp(_)))
            .count();
        let cfg = &self.cfg.powerups;
        if let Some(spawn) = powerup::roll_spawn(&mut self.rng, self.wave, active, &self.cfg.arena, cfg) {
            self.insert_powerup(spawn.kind, Vec2::new(spawn.x, 0.0));
        }
    }

    fn insert_powerup(&mut self, kind: PowerUpKind, position: Vec2) -> EntityId {
        let cfg = &self.cfg.powerups;
        let id = self.ids.alloc();
        self.entities.insert(id, Entity {
            id,
            kind: EntityKind::PowerUp(kind),
            position,
            velocity: Vec2::new(0.0, cfg.drift_speed),
            half_size: cfg.half_size,
            spawn_tick: self.tick,
            expires_at: Some(self.tick + cfg.ttl_ticks),
        });
        id
    }

    fn check_terminal(&mut self, transitions: &mut Vec<Transition>) {
        if !self.players.is_empty() && self.players.values().all(|p| !p.is_alive()) {
            self.end(Outcome::Defeat, transitions);
            return;
        }

        if self.wave == 0 || self.wave_pending || self.enemy_count() > 0 {
            return;
        }

        transitions.push(Transition::WaveCleared { wave: self.wave });
        tracing::info!(room = %self.room_id, tick = self.tick, wave = self.wave, "Wave cleared");
        for player in self.players.values_mut() {
            if let Some(achievement) = achievements::on_wave_cleared(player) {
                transitions.push(Transition::AchievementUnlocked {
                    player_id: player.id.clone(),
                    achievement,
                });
            }
        }

        if self.cfg.waves.max_waves.is_some_and(|max| self.wave >= max) {
            self.end(Outcome::Victory, transitions);
        } else {
            self.wave_pending = true;
        }
    }

    fn end(&mut self, outcome: Outcome, transitions: &mut Vec<Transition>) {
        self.state = RoomState::Ended;
        self.outcome = Some(outcome);
        let scores = self
            .players
            .values()
            .map(|p| (p.id.clone(), p.score))
            .collect();
        tracing::info!(room = %self.room_id, tick = self.tick, wave = self.wave, ?outcome, "Game ended");
        transitions.push(Transition::GameEnded {
            outcome,
            wave: self.wave,
            scores,
        });
    }
}

/// Direct entity injection for scenario tests.
#[cfg(any(test, feature = "test-helpers"))]
impl RoomSim {
    pub fn spawn_enemy(&mut self, pattern: crate::ai::EnemyPattern, position: Vec2, health: u32) -> EntityId {
        let id = self.ids.alloc();
        self.entities.insert(id, Entity {
            id,
            kind: EntityKind::Enemy(Enemy {
                pattern,
                health,
                score_value: self.cfg.enemies.score_value,
                fire_interval_ticks: None,
            }),
            position,
            velocity: Vec2::ZERO,
            half_size: self.cfg.enemies.half_size,
            spawn_tick: self.tick,
            expires_at: None,
        });
        id
    }

    pub fn spawn_player_bullet(&mut self, owner: &str, position: Vec2, velocity: Vec2, damage: u32) -> EntityId {
        let id = self.ids.alloc();
        self.entities.insert(id, Entity {
            id,
            kind: EntityKind::Bullet {
                owner: Shooter::Player(owner.to_string()),
                damage,
            },
            position,
            velocity,
            half_size: self.cfg.bullets.half_size,
            spawn_tick: self.tick,
            expires_at: Some(self.tick + self.cfg.bullets.ttl_ticks),
        });
        id
    }

    pub fn spawn_powerup(&mut self, kind: PowerUpKind, position: Vec2) -> EntityId {
        self.insert_powerup(kind, position)
    }

    /// Burn entity ids so the next spawn gets a specific id.
    pub fn skip_entity_ids(&mut self, n: u64) {
        for _ in 0..n {
            self.ids.alloc();
        }
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Remove every entity, e.g. to stage a scenario on an empty field.
    pub fn clear_entities(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::EnemyPattern;
    use crate::events::GameEventType;
    use crate::input::InputFrame;
    use crate::test_helpers::{join_both, quiet_config};

    const STILL: EnemyPattern = EnemyPattern::Static {
        fire_interval_ticks: 100_000,
    };

    /// Both players joined, wave 1 started, field cleared.
    fn active_sim_with(cfg: SimConfig) -> RoomSim {
        let mut sim = RoomSim::new("room", cfg);
        join_both(&mut sim);
        sim.step(vec![], vec![]);
        sim.clear_entities();
        sim
    }

    fn active_sim() -> RoomSim {
        active_sim_with(quiet_config())
    }

    fn types(out: &TickOutput) -> Vec<GameEventType> {
        out.events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn room_waits_for_min_players() {
        let mut sim = RoomSim::new("room", quiet_config());
        let out = sim.step(vec![SimCommand::Join("p1".into())], vec![]);
        assert_eq!(out.snapshot.state, RoomState::Waiting);
        assert_eq!(out.snapshot.wave, 0);
        let out = sim.step(vec![SimCommand::Join("p2".into())], vec![]);
        assert_eq!(out.snapshot.state, RoomState::Active);
        assert_eq!(out.snapshot.players.len(), 2);
        assert_eq!(types(&out), vec![GameEventType::PlayerJoined]);
        // Wave 1 starts on the tick that activates the room.
        assert_eq!(out.snapshot.wave, 1);
        assert!(out.snapshot.entities.iter().any(|e| e.health.is_some()));
        let out = sim.step(vec![], vec![]);
        assert_eq!(out.snapshot.wave, 1);
    }

    #[test]
    fn non_finite_powerup_scale_spawns_nothing() {
        let mut cfg = quiet_config();
        cfg.powerups.spawn_rate = 0.01;
        cfg.powerups.wave_scale = f64::INFINITY;
        let mut sim = RoomSim::new("room", cfg);
        join_both(&mut sim);
        for _ in 0..10 {
            sim.step(vec![], vec![]);
        }
        assert_eq!(sim.tick(), 11);
        assert!(
            !sim.entities()
                .any(|e| matches!(e.kind, EntityKind::PowerUp(_)))
        );
    }

    #[test]
    fn join_beyond_capacity_is_ignored() {
        let mut sim = RoomSim::new("room", quiet_config());
        sim.step(
            vec![
                SimCommand::Join("a".into()),
                SimCommand::Join("b".into()),
                SimCommand::Join("c".into()),
            ],
            vec![],
        );
        assert_eq!(sim.member_count(), 2);
        assert!(sim.player("c").is_none());
    }

    #[test]
    fn tick_increments_by_one_and_snapshot_matches() {
        let mut sim = RoomSim::new("room", quiet_config());
        for expected in 1..=5 {
            let out = sim.step(vec![], vec![]);
            assert_eq!(out.snapshot.tick, expected);
            assert_eq!(sim.tick(), expected);
        }
    }

    #[test]
    fn bullets_on_one_enemy_apply_in_id_order() {
        let mut sim = RoomSim::new("room", quiet_config());
        let pos = Vec2::new(400.0, 200.0);
        let enemy = sim.spawn_enemy(STILL, pos, 15);
        sim.skip_entity_ids(1);
        let b3 = sim.spawn_player_bullet("p1", pos, Vec2::ZERO, 10);
        sim.skip_entity_ids(3);
        let b7 = sim.spawn_player_bullet("p2", pos, Vec2::ZERO, 10);
        assert_eq!((b3, b7), (3, 7));

        sim.step(
            vec![SimCommand::Join("p1".into()), SimCommand::Join("p2".into())],
            vec![],
        );
        // 15 health: bullet 3 leaves 5, bullet 7 kills. Credit goes to p2.
        assert!(sim.entity(enemy).is_none());
        assert!(sim.entity(b3).is_none() && sim.entity(b7).is_none());
        assert_eq!(sim.player("p1").unwrap().kills, 0);
        assert_eq!(sim.player("p2").unwrap().kills, 1);
    }

    #[test]
    fn bullet_hits_only_lowest_id_target() {
        let mut sim = active_sim();
        let pos = Vec2::new(400.0, 200.0);
        let low = sim.spawn_enemy(STILL, pos, 50);
        let high = sim.spawn_enemy(STILL, pos + Vec2::new(4.0, 0.0), 50);
        sim.spawn_player_bullet("p1", pos + Vec2::new(2.0, 0.0), Vec2::ZERO, 10);
        sim.step(vec![], vec![]);
        let health = |id| sim.entity(id).and_then(Entity::as_enemy).map(|e| e.health);
        assert_eq!(health(low), Some(40));
        assert_eq!(health(high), Some(50));
    }

    #[test]
    fn killing_last_enemy_clears_wave_then_advances() {
        let mut sim = active_sim();
        assert_eq!(sim.wave(), 1);
        let pos = Vec2::new(400.0, 200.0);
        sim.spawn_enemy(STILL, pos, 10);
        sim.spawn_player_bullet("p1", pos, Vec2::ZERO, 10);

        let t = sim.step(vec![], vec![]);
        assert!(types(&t).contains(&GameEventType::WaveCleared));
        assert_eq!(t.snapshot.wave, 1);
        let cleared = t
            .events
            .iter()
            .find(|e| e.event_type == GameEventType::WaveCleared)
            .unwrap();
        assert_eq!(cleared.tick, t.snapshot.tick);

        let next = sim.step(vec![], vec![]);
        assert_eq!(next.snapshot.wave, 2);
        assert_eq!(next.snapshot.tick, t.snapshot.tick + 1);
        assert!(sim.enemy_count() > 0);
    }

    #[test]
    fn first_kill_unlocks_first_blood_once() {
        let mut sim = active_sim();
        let pos = Vec2::new(300.0, 150.0);
        sim.spawn_enemy(STILL, pos, 5);
        sim.spawn_enemy(STILL, Vec2::new(600.0, 150.0), 500);
        sim.spawn_player_bullet("p1", pos, Vec2::ZERO, 10);
        let out = sim.step(vec![], vec![]);
        let unlocked: Vec<_> = out
            .events
            .iter()
            .filter(|e| e.event_type == GameEventType::AchievementUnlocked)
            .collect();
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].payload["achievement"], "firstBlood");
    }

    #[test]
    fn same_kind_pickup_refreshes_expiry() {
        let mut sim = active_sim();
        sim.spawn_enemy(STILL, Vec2::new(50.0, 50.0), 500);
        let p1 = sim.player("p1").unwrap().position;
        sim.spawn_powerup(PowerUpKind::Shield, p1);
        sim.step(vec![], vec![]);
        let first = sim.player("p1").unwrap().effects.clone();
        assert_eq!(first.len(), 1);

        for _ in 0..10 {
            sim.step(vec![], vec![]);
        }
        let p1 = sim.player("p1").unwrap().position;
        sim.spawn_powerup(PowerUpKind::Shield, p1);
        let out = sim.step(vec![], vec![]);
        let effects = &sim.player("p1").unwrap().effects;
        assert_eq!(effects.len(), 1, "refresh must not add a second entry");
        assert_eq!(effects[0].expires_at, out.snapshot.tick + sim.config().powerups.shield_ticks);
        assert!(effects[0].expires_at > first[0].expires_at);
    }

    #[test]
    fn shield_blocks_contact_damage() {
        let mut sim = active_sim();
        let p1 = sim.player("p1").unwrap().position;
        let now = sim.tick();
        let cfg = sim.config().powerups.clone();
        apply_pickup(&mut sim.player_mut("p1").unwrap().effects, PowerUpKind::Shield, now, &cfg);
        sim.spawn_enemy(STILL, Vec2::new(50.0, 50.0), 500);
        let rammer = sim.spawn_enemy(STILL, p1, 500);
        sim.step(vec![], vec![]);
        assert!(sim.entity(rammer).is_none(), "rammer is destroyed");
        assert_eq!(sim.player("p1").unwrap().health, 100);
    }

    #[test]
    fn all_players_dead_ends_in_defeat() {
        let mut sim = active_sim();
        sim.spawn_enemy(STILL, Vec2::new(50.0, 50.0), 500);
        for id in ["p1", "p2"] {
            sim.player_mut(id).unwrap().health = 1;
        }
        let p1 = sim.player("p1").unwrap().position;
        let p2 = sim.player("p2").unwrap().position;
        sim.spawn_enemy(STILL, p1, 500);
        sim.spawn_enemy(STILL, p2, 500);
        let out = sim.step(vec![], vec![]);
        assert_eq!(out.snapshot.state, RoomState::Ended);
        assert_eq!(sim.outcome(), Some(Outcome::Defeat));
        let ended = out
            .events
            .iter()
            .find(|e| e.event_type == GameEventType::GameEnded)
            .unwrap();
        assert_eq!(ended.payload["outcome"], "defeat");

        // Ended rooms keep ticking snapshots but do not change.
        let after = sim.step(vec![], vec![]);
        assert_eq!(after.snapshot.state, RoomState::Ended);
        assert!(after.events.is_empty());
    }

    #[test]
    fn clearing_final_wave_is_victory() {
        let mut cfg = quiet_config();
        cfg.waves.max_waves = Some(1);
        let mut sim = active_sim_with(cfg);
        let pos = Vec2::new(400.0, 200.0);
        sim.spawn_enemy(STILL, pos, 1);
        sim.spawn_player_bullet("p2", pos, Vec2::ZERO, 10);
        let out = sim.step(vec![], vec![]);
        assert_eq!(out.snapshot.state, RoomState::Ended);
        assert_eq!(sim.outcome(), Some(Outcome::Victory));
        let kinds = types(&out);
        let cleared = kinds.iter().position(|t| *t == GameEventType::WaveCleared).unwrap();
        let ended = kinds.iter().position(|t| *t == GameEventType::GameEnded).unwrap();
        assert!(cleared < ended);
    }

    #[test]
    fn invalid_pattern_removes_only_that_enemy() {
        let mut sim = active_sim();
        let bad = sim.spawn_enemy(EnemyPattern::Unknown, Vec2::new(100.0, 100.0), 10);
        let good = sim.spawn_enemy(STILL, Vec2::new(200.0, 100.0), 10);
        let out = sim.step(vec![], vec![]);
        assert!(sim.entity(bad).is_none());
        assert!(sim.entity(good).is_some());
        assert_eq!(out.snapshot.state, RoomState::Active);
    }

    #[test]
    fn accepted_input_moves_player_and_fires() {
        let mut sim = active_sim();
        sim.spawn_enemy(STILL, Vec2::new(50.0, 50.0), 500);
        let start = sim.player("p1").unwrap().position;
        let input = PlayerInput::new("p1", InputFrame {
            x: start.x + 5.0,
            y: start.y,
            shoot: true,
            timestamp: 1_000,
            seq: 1,
        });
        let out = sim.step(vec![], vec![input]);
        let view = out.snapshot.players.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(view.x, start.x + 5.0);
        assert!(out
            .snapshot
            .entities
            .iter()
            .any(|e| e.subtype == "player" && e.vy < 0.0));
    }

    #[test]
    fn repeated_violations_flag_once() {
        let mut cfg = quiet_config();
        cfg.anticheat.violation_threshold = 3;
        let mut sim = RoomSim::new("room", cfg);
        join_both(&mut sim);
        let mut flagged = 0;
        for seq in 1..=6u32 {
            let input = PlayerInput::new("p1", InputFrame {
                x: 10.0,
                y: 10.0,
                shoot: false,
                timestamp: u64::from(seq) * 33,
                seq,
            });
            let out = sim.step(vec![], vec![input]);
            flagged += out
                .events
                .iter()
                .filter(|e| e.event_type == GameEventType::PlayerFlagged)
                .count();
        }
        assert_eq!(flagged, 1);
        assert!(sim.player("p1").unwrap().anticheat.flagged);
    }

    #[test]
    fn leaving_emits_event_and_counts_empty_ticks() {
        let mut sim = active_sim();
        sim.spawn_enemy(STILL, Vec2::new(50.0, 50.0), 500);
        let out = sim.step(
            vec![SimCommand::Leave("p1".into()), SimCommand::Leave("p2".into())],
            vec![],
        );
        assert_eq!(
            types(&out),
            vec![GameEventType::PlayerLeft, GameEventType::PlayerLeft]
        );
        assert_eq!(sim.empty_ticks(), 1);
        sim.step(vec![], vec![]);
        assert_eq!(sim.empty_ticks(), 2);
    }

    #[test]
    fn seed_derives_from_room_id_when_unset() {
        assert_eq!(fnv1a("abc"), fnv1a("abc"));
        assert_ne!(fnv1a("abc"), fnv1a("abd"));
    }
}
