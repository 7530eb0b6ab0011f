//! Entity model.
//!
//! Every moving thing in the level is an [`Entity`]: a category, an
//! activation flag, a transform and (for players) a rigid-body pose.
//! Networked entities additionally carry a session-scoped [`NetworkId`].

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Absolute horizontal/vertical scale of every sprite in the level.
pub const SPRITE_SCALE: f32 = 0.85;

/// Horizontal speed of a walking enemy, in units per second.
pub const ENEMY_SPEED: f32 = 3.0;

/// Horizontal speed of a missile, in units per second.
pub const MISSILE_SPEED: f32 = 4.0;

/// Entity category. Doubles as the pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityCategory {
    Coin,
    Enemy,
    Missile,
    Player,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 4] = [
        EntityCategory::Coin,
        EntityCategory::Enemy,
        EntityCategory::Missile,
        EntityCategory::Player,
    ];

    /// Collision tag carried by entities of this category.
    pub fn tag(self) -> CollisionTag {
        match self {
            EntityCategory::Coin => CollisionTag::COIN,
            EntityCategory::Enemy => CollisionTag::ENEMY,
            EntityCategory::Missile => CollisionTag::MISSILE,
            EntityCategory::Player => CollisionTag::PLAYER,
        }
    }

    /// Enemies and missiles travel horizontally on their own.
    pub fn is_mover(self) -> bool {
        matches!(self, EntityCategory::Enemy | EntityCategory::Missile)
    }
}

/// Session-scoped identifier of a networked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// Peer slot in a room: 1 or 2. 0 means "nobody".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerOrdinal(pub u8);

impl PeerOrdinal {
    pub const NOBODY: PeerOrdinal = PeerOrdinal(0);
    pub const ONE: PeerOrdinal = PeerOrdinal(1);
    pub const TWO: PeerOrdinal = PeerOrdinal(2);

    /// Which score column this ordinal feeds: `Some(true)` for player 1,
    /// `Some(false)` for player 2, `None` for anything else.
    pub fn score_slot(self) -> Option<bool> {
        match self.0 {
            1 => Some(true),
            2 => Some(false),
            _ => None,
        }
    }

    /// Room nickname for this ordinal.
    pub fn nickname(self) -> String {
        self.0.to_string()
    }
}

/// Per-scope allocator for [`NetworkId`]s.
///
/// Scope 0 is reserved for room objects created by the authority; a peer
/// allocates its own objects under its ordinal, so ids never collide across
/// peers.
#[derive(Debug, Clone)]
pub struct NetworkIdAllocator {
    scope: u32,
    next: u32,
}

/// Ids available per scope before wrapping.
pub const IDS_PER_SCOPE: u32 = 100_000;

impl NetworkIdAllocator {
    pub fn new(scope: u32) -> Self {
        Self { scope, next: 1 }
    }

    /// Allocator for room objects.
    pub fn room() -> Self {
        Self::new(0)
    }

    pub fn for_peer(ordinal: PeerOrdinal) -> Self {
        Self::new(u32::from(ordinal.0))
    }

    pub fn next_id(&mut self) -> NetworkId {
        let id = NetworkId(self.scope * IDS_PER_SCOPE + self.next);
        self.next = self.next % (IDS_PER_SCOPE - 1) + 1;
        id
    }
}

/// Position, rotation and horizontal facing of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Signed horizontal scale; the sign is the facing.
    pub facing: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            facing: SPRITE_SCALE,
        }
    }
}

impl Transform {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Rigid-body pose, tracked separately from the transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BodyPose {
    pub position: Vec2,
    pub rotation: f32,
}

/// A game entity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub category: EntityCategory,
    pub active: bool,
    pub transform: Transform,
    pub body: BodyPose,
    /// Horizontal travel direction (+1 right, -1 left) for movers.
    pub direction: f32,
    pub network_id: Option<NetworkId>,
}

impl Entity {
    /// A fresh, inactive instance.
    pub fn new(category: EntityCategory) -> Self {
        Self {
            category,
            active: false,
            transform: Transform::default(),
            body: BodyPose::default(),
            direction: 1.0,
            network_id: None,
        }
    }

    /// Resets the transform and body to `position` and makes the entity active.
    pub fn place(&mut self, position: Vec2) {
        self.transform = Transform::at(position);
        self.body = BodyPose {
            position,
            rotation: 0.0,
        };
        self.active = true;
        if self.category.is_mover() {
            self.launch();
        }
    }

    /// Picks the travel direction from the side of the screen the entity
    /// appears on: the left half heads right and vice versa.
    pub fn launch(&mut self) {
        self.direction = if self.transform.position.x < 0.0 { 1.0 } else { -1.0 };
        self.face_travel();
    }

    /// Reverses travel direction (enemy hitting a wall).
    pub fn turn(&mut self) {
        self.direction = -self.direction;
        self.face_travel();
    }

    fn face_travel(&mut self) {
        self.transform.facing = -self.direction * SPRITE_SCALE;
    }

    /// Moves an active mover along its travel direction.
    pub fn advance(&mut self, dt_sec: f32) {
        if !self.active {
            return;
        }
        let speed = match self.category {
            EntityCategory::Enemy => ENEMY_SPEED,
            EntityCategory::Missile => MISSILE_SPEED,
            _ => return,
        };
        self.transform.position.x += speed * self.direction * dt_sec;
        self.body.position = self.transform.position;
    }
}

bitflags::bitflags! {
    /// Collision/trigger tags reported by the physics collaborator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionTag: u8 {
        const ENEMY = 1 << 0;
        const MISSILE = 1 << 1;
        const COIN = 1 << 2;
        const GROUND = 1 << 3;
        const WALL = 1 << 4;
        const PIPE = 1 << 5;
        const PLAYER = 1 << 6;
        /// Tags that kill a player on contact.
        const HARMFUL = Self::ENEMY.bits() | Self::MISSILE.bits();
    }
}
