//! Spawn policy and spawn scheduling.
//!
//! A [`SpawnPolicy`] answers two questions for one entity type: where does
//! the next instance appear, and how long until the one after it. It keeps
//! no state of its own; randomness comes from the caller's RNG.
//!
//! A [`Spawner`] is the cooperative task that runs a policy. Instead of a
//! suspended coroutine it holds an explicit `next_fire` timestamp that is
//! re-armed every time it fires. Once enabled it runs until disabled.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, trace};

use crate::{authority::SpawnMode, entity::EntityCategory, math::Vec2};

/// Area a spawn position is sampled from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnRegion {
    /// Axis-aligned rectangle; a horizontal strip when `min.y == max.y`.
    Rect { min: Vec2, max: Vec2 },
    /// A fixed point.
    Point(Vec2),
}

impl SpawnRegion {
    /// Horizontal strip at height `y`.
    pub const fn strip(x_min: f32, x_max: f32, y: f32) -> Self {
        SpawnRegion::Rect {
            min: Vec2::new(x_min, y),
            max: Vec2::new(x_max, y),
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec2 {
        match *self {
            SpawnRegion::Rect { min, max } => Vec2::new(
                rng.gen_range(min.x..=max.x),
                rng.gen_range(min.y..=max.y),
            ),
            SpawnRegion::Point(p) => p,
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        match *self {
            SpawnRegion::Rect { min, max } => {
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
            }
            SpawnRegion::Point(q) => p == q,
        }
    }
}

/// A spawn region with a human-readable name (for logs).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamedRegion {
    pub name: &'static str,
    pub region: SpawnRegion,
}

/// Whole-second delay window, `min_secs..max_secs` (max exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Jitter {
    pub const fn secs(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs(self.min_secs);
        }
        Duration::from_secs(rng.gen_range(self.min_secs..self.max_secs))
    }
}

/// Timing of a spawn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Wait before the first spawn after enabling.
    pub initial_delay: Duration,
    /// Delay between spawns when running offline.
    pub solo: Jitter,
    /// Delay between spawns when running as the multiplayer authority.
    pub multiplayer: Jitter,
}

const COIN_REGIONS: [NamedRegion; 6] = [
    NamedRegion {
        name: "upper-left-ledge",
        region: SpawnRegion::strip(-7.65, -3.13, 4.5),
    },
    NamedRegion {
        name: "upper-right-ledge",
        region: SpawnRegion::strip(3.13, 7.65, 4.5),
    },
    NamedRegion {
        name: "center-ledge",
        region: SpawnRegion::strip(-1.75, 1.75, 2.0),
    },
    NamedRegion {
        name: "lower-left-ledge",
        region: SpawnRegion::strip(-8.8, -3.0, -1.0),
    },
    NamedRegion {
        name: "lower-right-ledge",
        region: SpawnRegion::strip(3.0, 8.8, -1.0),
    },
    NamedRegion {
        name: "left-step",
        region: SpawnRegion::Point(Vec2::new(-1.75, -3.5)),
    },
];

const MISSILE_REGIONS: [NamedRegion; 3] = [
    NamedRegion {
        name: "right-high",
        region: SpawnRegion::Point(Vec2::new(11.0, 2.23)),
    },
    NamedRegion {
        name: "right-low",
        region: SpawnRegion::Point(Vec2::new(11.0, -3.5)),
    },
    NamedRegion {
        name: "left-high",
        region: SpawnRegion::Point(Vec2::new(-11.0, 2.23)),
    },
];

/// Per-type position generator and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPolicy {
    pub category: EntityCategory,
    pub regions: Vec<NamedRegion>,
    pub cadence: Cadence,
}

impl SpawnPolicy {
    pub fn coins() -> Self {
        Self {
            category: EntityCategory::Coin,
            regions: COIN_REGIONS.to_vec(),
            cadence: Cadence {
                initial_delay: Duration::from_secs(1),
                solo: Jitter::secs(5, 10),
                multiplayer: Jitter::secs(3, 6),
            },
        }
    }

    pub fn missiles() -> Self {
        Self {
            category: EntityCategory::Missile,
            regions: MISSILE_REGIONS.to_vec(),
            cadence: Cadence {
                initial_delay: Duration::from_secs(3),
                solo: Jitter::secs(4, 7),
                multiplayer: Jitter::secs(4, 7),
            },
        }
    }

    /// Enemies walk out of a pipe at a fixed point.
    pub fn enemies_at(pipe: Vec2) -> Self {
        Self {
            category: EntityCategory::Enemy,
            regions: vec![NamedRegion {
                name: "pipe",
                region: SpawnRegion::Point(pipe),
            }],
            cadence: Cadence {
                initial_delay: Duration::ZERO,
                solo: Jitter::secs(3, 6),
                multiplayer: Jitter::secs(3, 6),
            },
        }
    }

    /// Uniform region choice, then a uniform sample inside it.
    pub fn next_position<R: Rng>(&self, rng: &mut R) -> Vec2 {
        if self.regions.is_empty() {
            return Vec2::ZERO;
        }
        let region = &self.regions[rng.gen_range(0..self.regions.len())];
        let position = region.region.sample(rng);
        trace!(region = region.name, ?position, "Sampled spawn position");
        position
    }

    /// Delay until the next spawn.
    pub fn cadence<R: Rng>(&self, multiplayer: bool, rng: &mut R) -> Duration {
        if multiplayer {
            self.cadence.multiplayer.sample(rng)
        } else {
            self.cadence.solo.sample(rng)
        }
    }

    pub fn initial_delay(&self) -> Duration {
        self.cadence.initial_delay
    }
}

/// A position produced by a spawner, waiting to be routed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub category: EntityCategory,
    pub position: Vec2,
}

/// Cooperative spawn loop for one policy.
#[derive(Debug, Clone)]
pub struct Spawner {
    policy: SpawnPolicy,
    mode: Option<SpawnMode>,
    next_fire: Option<Duration>,
}

impl Spawner {
    pub fn new(policy: SpawnPolicy) -> Self {
        Self {
            policy,
            mode: None,
            next_fire: None,
        }
    }

    pub fn policy(&self) -> &SpawnPolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.mode.is_some()
    }

    /// Whether the loop is armed (enabled in a mode that spawns).
    pub fn is_running(&self) -> bool {
        self.next_fire.is_some()
    }

    pub fn next_fire(&self) -> Option<Duration> {
        self.next_fire
    }

    /// Enables the spawner. The mode is fixed until the next `disable`;
    /// enabling an enabled spawner does nothing.
    pub fn enable(&mut self, mode: SpawnMode, now: Duration) {
        if self.mode.is_some() {
            return;
        }
        self.mode = Some(mode);
        self.next_fire = mode
            .runs_spawn_loop()
            .then(|| now + self.policy.initial_delay());
        debug!(category = ?self.policy.category, ?mode, running = self.next_fire.is_some(), "Spawner enabled");
    }

    pub fn disable(&mut self) {
        if self.mode.take().is_some() {
            debug!(category = ?self.policy.category, "Spawner disabled");
        }
        self.next_fire = None;
    }

    /// Fires at most once if the timer has elapsed, then re-arms.
    pub fn poll<R: Rng>(&mut self, now: Duration, rng: &mut R) -> Option<SpawnRequest> {
        let (Some(mode), Some(due)) = (self.mode, self.next_fire) else {
            return None;
        };
        if now < due {
            return None;
        }
        let position = self.policy.next_position(rng);
        let multiplayer = mode == SpawnMode::AuthoritativeOwner;
        self.next_fire = Some(now + self.policy.cadence(multiplayer, rng));
        Some(SpawnRequest {
            category: self.policy.category,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn coin_positions_fall_in_named_regions() {
        let policy = SpawnPolicy::coins();
        let mut rng = rng();
        for _ in 0..500 {
            let p = policy.next_position(&mut rng);
            assert!(
                policy.regions.iter().any(|r| r.region.contains(p)),
                "{p:?} outside every region"
            );
        }
    }

    #[test]
    fn missile_positions_are_launch_points() {
        let policy = SpawnPolicy::missiles();
        let mut rng = rng();
        for _ in 0..100 {
            let p = policy.next_position(&mut rng);
            assert_eq!(p.x.abs(), 11.0);
        }
    }

    #[test]
    fn enemy_spawns_at_pipe() {
        let pipe = Vec2::new(-7.0, 4.0);
        let policy = SpawnPolicy::enemies_at(pipe);
        assert_eq!(policy.next_position(&mut rng()), pipe);
    }

    #[test]
    fn coin_cadence_windows() {
        let policy = SpawnPolicy::coins();
        let mut rng = rng();
        for _ in 0..200 {
            let solo = policy.cadence(false, &mut rng).as_secs();
            assert!((5..10).contains(&solo));
            let multi = policy.cadence(true, &mut rng).as_secs();
            assert!((3..6).contains(&multi));
        }
    }

    #[test]
    fn degenerate_jitter_is_fixed() {
        assert_eq!(Jitter::secs(2, 2).sample(&mut rng()), Duration::from_secs(2));
    }

    #[test]
    fn spawner_waits_initial_delay_then_repeats() {
        let mut spawner = Spawner::new(SpawnPolicy::missiles());
        let mut rng = rng();
        spawner.enable(SpawnMode::Solo, Duration::ZERO);
        assert!(spawner.poll(Duration::from_secs(2), &mut rng).is_none());

        let req = spawner.poll(Duration::from_secs(3), &mut rng).unwrap();
        assert_eq!(req.category, EntityCategory::Missile);

        let next = spawner.next_fire().unwrap();
        assert!(next >= Duration::from_secs(7) && next < Duration::from_secs(10));
        assert!(spawner.poll(Duration::from_secs(3), &mut rng).is_none());
    }

    #[test]
    fn fires_at_most_once_per_poll() {
        let mut spawner = Spawner::new(SpawnPolicy::enemies_at(Vec2::ZERO));
        let mut rng = rng();
        spawner.enable(SpawnMode::AuthoritativeOwner, Duration::ZERO);
        assert!(spawner.poll(Duration::from_secs(100), &mut rng).is_some());
        assert!(spawner.poll(Duration::from_secs(100), &mut rng).is_none());
    }

    #[test]
    fn guest_never_arms() {
        let mut spawner = Spawner::new(SpawnPolicy::coins());
        spawner.enable(SpawnMode::AuthoritativeGuest, Duration::ZERO);
        assert!(spawner.is_enabled());
        assert!(!spawner.is_running());
        assert!(spawner.poll(Duration::from_secs(60), &mut rng()).is_none());
    }

    #[test]
    fn enable_is_one_shot_until_disabled() {
        let mut spawner = Spawner::new(SpawnPolicy::coins());
        spawner.enable(SpawnMode::AuthoritativeOwner, Duration::ZERO);
        let armed = spawner.next_fire();
        spawner.enable(SpawnMode::AuthoritativeGuest, Duration::from_secs(10));
        assert_eq!(spawner.next_fire(), armed);

        spawner.disable();
        assert!(!spawner.is_enabled());
        assert!(spawner.poll(Duration::from_secs(60), &mut rng()).is_none());

        spawner.enable(SpawnMode::Solo, Duration::from_secs(10));
        assert_eq!(spawner.next_fire(), Some(Duration::from_secs(11)));
    }
}
