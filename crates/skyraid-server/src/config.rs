use serde::Deserialize;

use skyraid_core::config::{ConfigError, SimConfig};

/// Top-level server configuration, loaded from `skyraid.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub sim: SimConfig,
    pub rooms: RoomsConfig,
}

/// Room hosting: queues, reaping and fan-out.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Bounded per-room input queue.
    pub input_queue_capacity: usize,
    /// Ticks with zero members before a room is reaped.
    pub idle_timeout_ticks: u64,
    /// How long an ENDED room accepts reconnects before it is reaped.
    pub ended_grace_secs: u64,
    pub reap_interval_ms: u64,
    /// TTL of room summaries in the room directory.
    pub directory_ttl_secs: u64,
    /// Per-room broadcast channel capacity (frames).
    pub broadcast_capacity: usize,
    /// Full snapshot every N frames; deltas in between.
    pub keyframe_interval: u64,
    /// Outbound event channel capacity.
    pub event_capacity: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            input_queue_capacity: 256,
            idle_timeout_ticks: 900, // ~30s at 33ms
            ended_grace_secs: 30,
            reap_interval_ms: 1000,
            directory_ttl_secs: 60,
            broadcast_capacity: 64,
            keyframe_interval: 30,
            event_capacity: 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::new("skyraid.toml", e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim.validate()?;
        let r = &self.rooms;
        if r.input_queue_capacity == 0 {
            return Err(ConfigError::new("rooms.input_queue_capacity", "must be > 0"));
        }
        if r.idle_timeout_ticks == 0 {
            return Err(ConfigError::new("rooms.idle_timeout_ticks", "must be > 0"));
        }
        if r.reap_interval_ms == 0 {
            return Err(ConfigError::new("rooms.reap_interval_ms", "must be > 0"));
        }
        if r.broadcast_capacity == 0 {
            return Err(ConfigError::new("rooms.broadcast_capacity", "must be > 0"));
        }
        if r.keyframe_interval == 0 {
            return Err(ConfigError::new("rooms.keyframe_interval", "must be > 0"));
        }
        if r.event_capacity == 0 {
            return Err(ConfigError::new("rooms.event_capacity", "must be > 0"));
        }
        Ok(())
    }

    /// Load config from `skyraid.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("skyraid.toml") {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from skyraid.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse skyraid.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No skyraid.toml found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `SKYRAID_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, val: Option<String>) -> Option<T> {
            let val = val.filter(|v| !v.is_empty())?;
            match val.parse::<T>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(key, value = %val, "Ignoring unparseable env override");
                    None
                },
            }
        }

        const TICK: &str = "SKYRAID_TICK_RATE_MS";
        const MAX_PLAYERS: &str = "SKYRAID_MAX_PLAYERS";
        const MAX_SPEED: &str = "SKYRAID_MAX_SPEED";
        const COOLDOWN: &str = "SKYRAID_FIRE_COOLDOWN_MS";
        const THRESHOLD: &str = "SKYRAID_VIOLATION_THRESHOLD";
        const SPAWN_RATE: &str = "SKYRAID_POWERUP_SPAWN_RATE";
        const MAX_ACTIVE: &str = "SKYRAID_POWERUP_MAX_ACTIVE";
        const QUEUE: &str = "SKYRAID_INPUT_QUEUE_CAPACITY";

        if let Some(n) = parse(TICK, lookup(TICK)) {
            self.sim.tick_rate_ms = n;
        }
        if let Some(n) = parse::<usize>(MAX_PLAYERS, lookup(MAX_PLAYERS)) {
            self.sim.room.max_players = n;
            // Keep the pair consistent when only the capacity is overridden.
            self.sim.room.min_players = self.sim.room.min_players.min(n);
        }
        if let Some(n) = parse(MAX_SPEED, lookup(MAX_SPEED)) {
            self.sim.anticheat.max_speed = n;
        }
        if let Some(n) = parse(COOLDOWN, lookup(COOLDOWN)) {
            self.sim.anticheat.fire_cooldown_ms = n;
        }
        if let Some(n) = parse(THRESHOLD, lookup(THRESHOLD)) {
            self.sim.anticheat.violation_threshold = n;
        }
        if let Some(n) = parse(SPAWN_RATE, lookup(SPAWN_RATE)) {
            self.sim.powerups.spawn_rate = n;
        }
        if let Some(n) = parse(MAX_ACTIVE, lookup(MAX_ACTIVE)) {
            self.sim.powerups.max_active = n;
        }
        if let Some(n) = parse(QUEUE, lookup(QUEUE)) {
            self.rooms.input_queue_capacity = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.sim.tick_rate_ms, 33);
        assert_eq!(cfg.sim.room.max_players, 2);
        assert_eq!(cfg.rooms.input_queue_capacity, 256);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
[sim]
tick_rate_ms = 16

[sim.anticheat]
fire_cooldown_ms = 150

[rooms]
keyframe_interval = 10
"#;
        let cfg = ServerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(cfg.sim.tick_rate_ms, 16);
        assert_eq!(cfg.sim.anticheat.fire_cooldown_ms, 150);
        assert_eq!(cfg.rooms.keyframe_interval, 10);
        assert_eq!(cfg.rooms.broadcast_capacity, 64);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = ServerConfig::from_toml_str("[sim\ntick").unwrap_err();
        assert_eq!(err.field, "skyraid.toml");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SKYRAID_TICK_RATE_MS", "20"),
            ("SKYRAID_MAX_PLAYERS", "1"),
            ("SKYRAID_MAX_SPEED", "450.5"),
            ("SKYRAID_POWERUP_SPAWN_RATE", "0.01"),
            ("SKYRAID_INPUT_QUEUE_CAPACITY", "not-a-number"),
        ]);
        let mut cfg = ServerConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.sim.tick_rate_ms, 20);
        assert_eq!(cfg.sim.room.max_players, 1);
        assert_eq!(cfg.sim.room.min_players, 1);
        assert!((cfg.sim.anticheat.max_speed - 450.5).abs() < f32::EPSILON);
        assert!((cfg.sim.powerups.spawn_rate - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.rooms.input_queue_capacity, 256, "bad value ignored");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut cfg = ServerConfig::default();
        cfg.rooms.input_queue_capacity = 0;
        assert_eq!(cfg.validate().unwrap_err().field, "rooms.input_queue_capacity");
    }
}
