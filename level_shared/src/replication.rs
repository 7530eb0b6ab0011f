//! Player state replication.
//!
//! The owning peer captures a [`PlayerSnapshot`] once per network tick and
//! ships it as six floats in a fixed order:
//!
//! `[pos.x, pos.y, facing, body.x, body.y, body.rotation]`
//!
//! The receiver overwrites its copy with whatever arrived last. There is no
//! sequence number, so a reordered or duplicated snapshot simply wins.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    entity::{BodyPose, Entity},
    math::Vec2,
};

/// Replicated player state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub position: Vec2,
    pub facing: f32,
    pub body_position: Vec2,
    pub body_rotation: f32,
}

impl PlayerSnapshot {
    pub fn capture(entity: &Entity) -> Self {
        Self {
            position: entity.transform.position,
            facing: entity.transform.facing,
            body_position: entity.body.position,
            body_rotation: entity.body.rotation,
        }
    }

    /// Unconditional overwrite of the replicated fields.
    pub fn apply(&self, entity: &mut Entity) {
        entity.transform.position = self.position;
        entity.transform.facing = self.facing;
        entity.body = BodyPose {
            position: self.body_position,
            rotation: self.body_rotation,
        };
    }

    pub fn to_wire(&self) -> [f32; 6] {
        [
            self.position.x,
            self.position.y,
            self.facing,
            self.body_position.x,
            self.body_position.y,
            self.body_rotation,
        ]
    }

    pub fn from_wire(fields: [f32; 6]) -> Self {
        let [px, py, facing, bx, by, rotation] = fields;
        Self {
            position: Vec2::new(px, py),
            facing,
            body_position: Vec2::new(bx, by),
            body_rotation: rotation,
        }
    }
}

/// Send-rate gate for snapshots.
#[derive(Debug, Clone)]
pub struct ReplicationChannel {
    interval: Duration,
    next_send: Duration,
}

impl ReplicationChannel {
    pub fn new(send_rate_hz: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(send_rate_hz.max(1))),
            next_send: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True once per network tick.
    pub fn due(&mut self, now: Duration) -> bool {
        if now < self.next_send {
            return false;
        }
        self.next_send = now + self.interval;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityCategory, SPRITE_SCALE};

    fn snapshot(x: f32) -> PlayerSnapshot {
        PlayerSnapshot {
            position: Vec2::new(x, -5.4),
            facing: -SPRITE_SCALE,
            body_position: Vec2::new(x, -5.4),
            body_rotation: 3.0,
        }
    }

    #[test]
    fn wire_order_is_fixed() {
        let s = snapshot(1.5);
        assert_eq!(s.to_wire(), [1.5, -5.4, -SPRITE_SCALE, 1.5, -5.4, 3.0]);
        assert_eq!(PlayerSnapshot::from_wire(s.to_wire()), s);
    }

    #[test]
    fn apply_is_idempotent() {
        let mut once = Entity::new(EntityCategory::Player);
        snapshot(2.0).apply(&mut once);
        let mut twice = once.clone();
        snapshot(2.0).apply(&mut twice);
        assert_eq!(once, twice);
        assert_eq!(PlayerSnapshot::capture(&once), snapshot(2.0));
    }

    #[test]
    fn last_applied_wins_even_if_stale() {
        let mut e = Entity::new(EntityCategory::Player);
        snapshot(5.0).apply(&mut e);
        snapshot(1.0).apply(&mut e);
        assert_eq!(e.transform.position.x, 1.0);
    }

    #[test]
    fn channel_gates_to_send_rate() {
        let mut ch = ReplicationChannel::new(10);
        assert!(ch.due(Duration::ZERO));
        assert!(!ch.due(Duration::from_millis(50)));
        assert!(ch.due(Duration::from_millis(100)));
    }
}
