//! Relay room membership and call routing.
//!
//! # Room Lifecycle
//! 1. The first peer joins and becomes ordinal 1 and the authority.
//! 2. A second peer joins as ordinal 2.
//! 3. If the authority leaves, the remaining peer inherits the role.
//! 4. The room persists until empty.
//!
//! Nicknames follow the ordinal, so the room owner is always `"1"`.
//!
//! # Creation cache
//! Creation calls (`InstantiateCoin`, `InstantiatePlayer`) are cached so a
//! peer joining later sees objects created before it arrived. A cached
//! entry is dropped when the object is destroyed, and player avatars are
//! dropped when their owner leaves.

use std::fmt;
use std::time::Instant;

use crate::{
    entity::{NetworkId, PeerOrdinal},
    net::{CallTarget, RemoteCall},
};

/// Maximum peers per room.
pub const MAX_PEERS: usize = 2;

/// Nickname of the peer that owns the room.
pub const ROOM_OWNER_NICKNAME: &str = "1";

/// A room member.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub ordinal: PeerOrdinal,
    pub nickname: String,
    pub joined_at: Instant,
}

impl RoomMember {
    pub fn new(ordinal: PeerOrdinal) -> Self {
        RoomMember {
            ordinal,
            nickname: ordinal.nickname(),
            joined_at: Instant::now(),
        }
    }
}

/// Room operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    RoomFull,
    NotMember,
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::RoomFull => write!(f, "room is full"),
            RoomError::NotMember => write!(f, "peer is not in the room"),
        }
    }
}

impl std::error::Error for RoomError {}

#[derive(Debug, Clone)]
struct CachedCall {
    from: PeerOrdinal,
    id: NetworkId,
    call: RemoteCall,
    /// Room objects outlive their creator.
    room_object: bool,
}

/// A two-peer room.
#[derive(Debug, Default)]
pub struct Room {
    members: Vec<RoomMember>,
    authority: Option<PeerOrdinal>,
    cache: Vec<CachedCall>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> u8 {
        self.members.len() as u8
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_PEERS
    }

    pub fn is_member(&self, ordinal: PeerOrdinal) -> bool {
        self.members.iter().any(|m| m.ordinal == ordinal)
    }

    pub fn members(&self) -> &[RoomMember] {
        &self.members
    }

    /// Current authority, or `NOBODY` when the room is empty.
    pub fn authority(&self) -> PeerOrdinal {
        self.authority.unwrap_or(PeerOrdinal::NOBODY)
    }

    /// Adds a peer under the lowest free ordinal.
    pub fn join(&mut self) -> Result<RoomMember, RoomError> {
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        let ordinal = (1..=MAX_PEERS as u8)
            .map(PeerOrdinal)
            .find(|o| !self.is_member(*o))
            .ok_or(RoomError::RoomFull)?;
        let member = RoomMember::new(ordinal);
        self.members.push(member.clone());
        if self.authority.is_none() {
            self.authority = Some(ordinal);
        }
        Ok(member)
    }

    /// Removes a peer, handing authority to whoever remains.
    pub fn leave(&mut self, ordinal: PeerOrdinal) -> Result<RoomMember, RoomError> {
        let idx = self
            .members
            .iter()
            .position(|m| m.ordinal == ordinal)
            .ok_or(RoomError::NotMember)?;
        let member = self.members.remove(idx);

        if self.authority == Some(ordinal) {
            self.authority = self.members.first().map(|m| m.ordinal);
        }
        self.cache.retain(|c| c.room_object || c.from != ordinal);
        if self.members.is_empty() {
            self.cache.clear();
        }
        Ok(member)
    }

    /// Resolves a call target to recipient ordinals.
    pub fn route(&self, from: PeerOrdinal, target: CallTarget) -> Vec<PeerOrdinal> {
        match target {
            CallTarget::All | CallTarget::RoomObject => {
                self.members.iter().map(|m| m.ordinal).collect()
            }
            CallTarget::Others => self
                .members
                .iter()
                .map(|m| m.ordinal)
                .filter(|o| *o != from)
                .collect(),
            CallTarget::Authority => self.authority.into_iter().collect(),
        }
    }

    /// Updates the creation cache for a call passing through the relay.
    pub fn record(&mut self, from: PeerOrdinal, target: CallTarget, call: &RemoteCall) {
        match call {
            RemoteCall::DestroyNetworkObject { id } => {
                self.cache.retain(|c| c.id != *id);
            }
            _ => {
                if let Some(id) = call.created_id() {
                    self.cache.retain(|c| c.id != id);
                    self.cache.push(CachedCall {
                        from,
                        id,
                        call: call.clone(),
                        room_object: target == CallTarget::RoomObject,
                    });
                }
            }
        }
    }

    /// Cached creation calls to replay to a joiner, oldest first.
    pub fn cached_calls(&self) -> Vec<(PeerOrdinal, RemoteCall)> {
        self.cache.iter().map(|c| (c.from, c.call.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;

    fn player(id: u32, ordinal: PeerOrdinal) -> RemoteCall {
        RemoteCall::InstantiatePlayer {
            id: NetworkId(id),
            ordinal,
            position: Vec2::ZERO,
        }
    }

    fn coin(id: u32) -> RemoteCall {
        RemoteCall::InstantiateCoin {
            id: NetworkId(id),
            position: Vec2::ZERO,
        }
    }

    // =============================================================================
    // ROOM-001: Membership
    // =============================================================================

    #[test]
    fn room_001_first_joiner_is_owner_and_authority() {
        let mut room = Room::new();
        let first = room.join().unwrap();
        assert_eq!(first.ordinal, PeerOrdinal::ONE);
        assert_eq!(first.nickname, ROOM_OWNER_NICKNAME);
        assert_eq!(room.authority(), PeerOrdinal::ONE);

        let second = room.join().unwrap();
        assert_eq!(second.ordinal, PeerOrdinal::TWO);
        assert_eq!(room.peer_count(), 2);
    }

    #[test]
    fn room_001_third_peer_is_rejected() {
        let mut room = Room::new();
        room.join().unwrap();
        room.join().unwrap();
        assert_eq!(room.join().unwrap_err(), RoomError::RoomFull);
    }

    #[test]
    fn room_001_rejoin_takes_lowest_free_ordinal() {
        let mut room = Room::new();
        room.join().unwrap();
        room.join().unwrap();
        room.leave(PeerOrdinal::TWO).unwrap();
        assert_eq!(room.join().unwrap().ordinal, PeerOrdinal::TWO);
        assert_eq!(room.leave(PeerOrdinal(7)).unwrap_err(), RoomError::NotMember);
    }

    #[test]
    fn room_001_authority_transfers_on_leave() {
        let mut room = Room::new();
        room.join().unwrap();
        room.join().unwrap();
        room.leave(PeerOrdinal::ONE).unwrap();
        assert_eq!(room.authority(), PeerOrdinal::TWO);
        room.leave(PeerOrdinal::TWO).unwrap();
        assert_eq!(room.authority(), PeerOrdinal::NOBODY);
    }

    // =============================================================================
    // ROOM-002: Routing
    // =============================================================================

    #[test]
    fn room_002_route_targets() {
        let mut room = Room::new();
        room.join().unwrap();
        room.join().unwrap();
        let both = vec![PeerOrdinal::ONE, PeerOrdinal::TWO];
        assert_eq!(room.route(PeerOrdinal::TWO, CallTarget::All), both);
        assert_eq!(room.route(PeerOrdinal::TWO, CallTarget::RoomObject), both);
        assert_eq!(
            room.route(PeerOrdinal::TWO, CallTarget::Others),
            vec![PeerOrdinal::ONE]
        );
        assert_eq!(
            room.route(PeerOrdinal::TWO, CallTarget::Authority),
            vec![PeerOrdinal::ONE]
        );
    }

    // =============================================================================
    // ROOM-003: Creation cache
    // =============================================================================

    #[test]
    fn room_003_cache_tracks_live_creations() {
        let mut room = Room::new();
        room.join().unwrap();
        room.record(PeerOrdinal::ONE, CallTarget::All, &player(100_001, PeerOrdinal::ONE));
        room.record(PeerOrdinal::ONE, CallTarget::RoomObject, &coin(1));
        room.record(PeerOrdinal::ONE, CallTarget::RoomObject, &coin(2));
        room.record(
            PeerOrdinal::ONE,
            CallTarget::Others,
            &RemoteCall::DestroyNetworkObject { id: NetworkId(1) },
        );
        room.record(PeerOrdinal::ONE, CallTarget::All, &RemoteCall::EnableGenerators);

        let cached: Vec<RemoteCall> = room.cached_calls().into_iter().map(|(_, c)| c).collect();
        assert_eq!(cached, vec![player(100_001, PeerOrdinal::ONE), coin(2)]);
    }

    #[test]
    fn room_003_leaver_takes_its_avatar_not_room_objects() {
        let mut room = Room::new();
        room.join().unwrap();
        room.join().unwrap();
        room.record(PeerOrdinal::TWO, CallTarget::All, &player(200_001, PeerOrdinal::TWO));
        room.record(PeerOrdinal::ONE, CallTarget::RoomObject, &coin(5));
        room.leave(PeerOrdinal::TWO).unwrap();

        let cached: Vec<RemoteCall> = room.cached_calls().into_iter().map(|(_, c)| c).collect();
        assert_eq!(cached, vec![coin(5)]);
    }
}
