//! Spawn authority.
//!
//! Decides, per session mode, whether a spawn happens locally or is
//! requested through the relay, and turns inbound spawn calls into pool
//! instantiations.
//!
//! | mode                 | spawn loop | on `request_spawn`                      |
//! |----------------------|------------|-----------------------------------------|
//! | `Solo`               | yes        | instantiate from the pool now           |
//! | `AuthoritativeOwner` | yes        | issue a remote call to every peer       |
//! | `AuthoritativeGuest` | no         | nothing (receives the owner's calls)    |

use tracing::debug;

use crate::{
    entity::{EntityCategory, NetworkIdAllocator, PeerOrdinal},
    math::Vec2,
    net::{CallTarget, Outgoing, RemoteCall},
    pool::{EntityHandle, EntityPool},
    spawn::SpawnRequest,
};

/// How this peer takes part in spawning. Fixed when the spawners are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    Solo,
    AuthoritativeOwner,
    AuthoritativeGuest,
}

impl SpawnMode {
    pub fn resolve(connected: bool, ordinal: PeerOrdinal) -> Self {
        if !connected {
            SpawnMode::Solo
        } else if ordinal == PeerOrdinal::TWO {
            SpawnMode::AuthoritativeGuest
        } else {
            SpawnMode::AuthoritativeOwner
        }
    }

    pub fn runs_spawn_loop(self) -> bool {
        self != SpawnMode::AuthoritativeGuest
    }
}

/// What became of a spawn request.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnDecision {
    /// Instantiated locally.
    Local(EntityHandle),
    /// Must be sent to the relay.
    Remote(Outgoing),
    /// Pool exhausted, or this peer doesn't spawn.
    Dropped,
}

pub struct AuthorityRouter {
    mode: SpawnMode,
    room_ids: NetworkIdAllocator,
}

impl Default for AuthorityRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorityRouter {
    pub fn new() -> Self {
        Self {
            mode: SpawnMode::Solo,
            room_ids: NetworkIdAllocator::room(),
        }
    }

    pub fn mode(&self) -> SpawnMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SpawnMode) {
        self.mode = mode;
    }

    pub fn request_spawn(&mut self, request: SpawnRequest, pool: &mut EntityPool) -> SpawnDecision {
        let SpawnRequest { category, position } = request;
        match self.mode {
            SpawnMode::Solo => pool
                .spawn(category, position)
                .map_or(SpawnDecision::Dropped, SpawnDecision::Local),
            SpawnMode::AuthoritativeOwner => {
                let outgoing = match category {
                    EntityCategory::Coin => Outgoing::new(
                        CallTarget::RoomObject,
                        RemoteCall::InstantiateCoin {
                            id: self.room_ids.next_id(),
                            position,
                        },
                    ),
                    EntityCategory::Enemy => {
                        Outgoing::new(CallTarget::All, RemoteCall::InstantiateEnemy { position })
                    }
                    EntityCategory::Missile => {
                        Outgoing::new(CallTarget::All, RemoteCall::InstantiateMissile { position })
                    }
                    EntityCategory::Player => {
                        debug!("Players are not spawned by generators");
                        return SpawnDecision::Dropped;
                    }
                };
                SpawnDecision::Remote(outgoing)
            }
            SpawnMode::AuthoritativeGuest => {
                debug!(?category, "Guest does not originate spawns");
                SpawnDecision::Dropped
            }
        }
    }

    /// One pool instantiation per received call; no dedup.
    pub fn on_remote_spawn(
        &self,
        category: EntityCategory,
        position: Vec2,
        pool: &mut EntityPool,
    ) -> Option<EntityHandle> {
        pool.spawn(category, position)
    }
}
