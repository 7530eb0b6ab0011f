//! Level configuration.
//!
//! Loaded from JSON strings (file IO is left to the binaries). Every field
//! has a default, so a partial file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{entity::EntityCategory, math::Vec2};

/// Cold-start pool population per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizes {
    pub coin: usize,
    pub enemy: usize,
    pub missile: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            coin: 10,
            enemy: 10,
            missile: 10,
        }
    }
}

impl PoolSizes {
    pub fn for_category(&self, category: EntityCategory) -> usize {
        match category {
            EntityCategory::Coin => self.coin,
            EntityCategory::Enemy => self.enemy,
            EntityCategory::Missile => self.missile,
            // Avatars are networked objects, never pooled.
            EntityCategory::Player => 0,
        }
    }
}

/// Root configuration shared by relay and peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Relay listen/connect address, e.g. `127.0.0.1:40100`.
    pub relay_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Player snapshots per second.
    pub send_rate_hz: u32,
    /// High-score save file.
    pub save_path: String,
    pub save_slot: u8,
    /// Delay before a dead online player reappears.
    pub respawn_delay_ms: u64,
    pub pool: PoolSizes,
    /// One enemy generator per pipe.
    pub enemy_spawn_points: Vec<Vec2>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:40100".to_string(),
            tick_hz: 60,
            send_rate_hz: 10,
            save_path: "highscore.json".to_string(),
            save_slot: 1,
            respawn_delay_ms: 2000,
            pool: PoolSizes::default(),
            enemy_spawn_points: vec![Vec2::new(-7.0, 4.0), Vec2::new(7.0, 4.0)],
        }
    }
}

impl LevelConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }
}
