//! Display smoothing for remote avatars.
//!
//! Replicated state is applied as-is; this only eases the *drawn* position
//! toward the latest applied snapshot. Nothing here is fed back into the
//! level.

use level_shared::math::Vec2;

/// Teleport instead of easing past this distance (respawns, first sight).
pub const SNAP_DISTANCE: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPose {
    displayed: Vec2,
    target: Vec2,
    /// Fraction of the remaining gap closed per second.
    rate: f32,
}

impl SmoothedPose {
    pub fn new(at: Vec2, rate: f32) -> Self {
        Self {
            displayed: at,
            target: at,
            rate,
        }
    }

    pub fn displayed(&self) -> Vec2 {
        self.displayed
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn retarget(&mut self, target: Vec2) {
        self.target = target;
        if self.displayed.distance(target) > SNAP_DISTANCE {
            self.displayed = target;
        }
    }

    pub fn step(&mut self, dt_sec: f32) -> Vec2 {
        self.displayed = self.displayed.lerp(self.target, self.rate * dt_sec);
        self.displayed
    }
}
