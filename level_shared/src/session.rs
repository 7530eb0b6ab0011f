//! Session lifecycle.
//!
//! Tracks whether this peer plays offline or in a two-peer room and maps
//! room events onto the actions the level has to take. The state machine
//! itself performs nothing; callers execute the returned
//! [`LifecycleAction`]s in order.
//!
//! ```text
//! Offline --start_solo--> Solo
//! Offline --joined(1)--> WaitingForPeer --peer_joined(2)--> ActiveTwoPeer
//! Offline --joined(2)--> ActiveTwoPeer
//! ActiveTwoPeer --peer_left(guest)--> WaitingForPeer
//! ActiveTwoPeer --peer_left(owner)--> OwnerLost
//! any online --disconnected--> Disconnected
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{entity::PeerOrdinal, room::ROOM_OWNER_NICKNAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Offline,
    Solo,
    WaitingForPeer,
    ActiveTwoPeer,
    /// The room owner left; the room is abandoned.
    OwnerLost,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::OwnerLost | SessionState::Disconnected)
    }

    pub fn is_online(self) -> bool {
        matches!(
            self,
            SessionState::WaitingForPeer | SessionState::ActiveTwoPeer
        )
    }
}

/// UI panels the level toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Panel {
    Waiting,
    PlayerLost,
    GameOver,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    StartGame,
    EnableGenerators,
    /// Ask every peer (self included) to enable their generators.
    BroadcastEnableGenerators,
    DisableGenerators,
    CleanScene,
    LeaveRoom,
    ShowPanel(Panel),
    HidePanel(Panel),
    ReloadScene,
}

#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: SessionState,
    ordinal: PeerOrdinal,
    peer_count: u8,
    authority: PeerOrdinal,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Offline,
            ordinal: PeerOrdinal::NOBODY,
            peer_count: 0,
            authority: PeerOrdinal::NOBODY,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ordinal(&self) -> PeerOrdinal {
        self.ordinal
    }

    pub fn peer_count(&self) -> u8 {
        self.peer_count
    }

    pub fn authority(&self) -> PeerOrdinal {
        self.authority
    }

    /// Connected to a room (including after the owner left, until the room
    /// is actually left).
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.state,
            SessionState::Offline | SessionState::Solo | SessionState::Disconnected
        )
    }

    /// Offline play is its own authority.
    pub fn is_authority(&self) -> bool {
        !self.is_connected() || self.authority == self.ordinal
    }

    /// Starts (or restarts) an offline game.
    pub fn start_solo(&mut self) -> Vec<LifecycleAction> {
        if !matches!(self.state, SessionState::Offline | SessionState::Solo) {
            warn!(state = ?self.state, "Solo start ignored while online");
            return Vec::new();
        }
        self.state = SessionState::Solo;
        self.ordinal = PeerOrdinal::ONE;
        self.authority = PeerOrdinal::ONE;
        self.peer_count = 1;
        vec![
            LifecycleAction::HidePanel(Panel::GameOver),
            LifecycleAction::StartGame,
            LifecycleAction::EnableGenerators,
        ]
    }

    pub fn on_joined_room(
        &mut self,
        ordinal: PeerOrdinal,
        peer_count: u8,
        authority: PeerOrdinal,
    ) -> Vec<LifecycleAction> {
        if self.state != SessionState::Offline {
            warn!(state = ?self.state, "Join ignored, session already started");
            return Vec::new();
        }
        self.ordinal = ordinal;
        self.peer_count = peer_count;
        self.authority = authority;

        let panel = if peer_count >= 2 {
            self.state = SessionState::ActiveTwoPeer;
            LifecycleAction::HidePanel(Panel::Waiting)
        } else {
            self.state = SessionState::WaitingForPeer;
            LifecycleAction::ShowPanel(Panel::Waiting)
        };
        info!(?ordinal, peer_count, state = ?self.state, "Joined room");
        vec![panel, LifecycleAction::StartGame]
    }

    pub fn on_peer_joined(&mut self, peer_count: u8) -> Vec<LifecycleAction> {
        if !self.state.is_online() {
            debug!(state = ?self.state, "Peer join ignored");
            return Vec::new();
        }
        self.peer_count = peer_count;
        if peer_count < 2 {
            return Vec::new();
        }
        self.state = SessionState::ActiveTwoPeer;
        let mut actions = vec![LifecycleAction::HidePanel(Panel::Waiting)];
        if self.is_authority() {
            actions.push(LifecycleAction::BroadcastEnableGenerators);
        }
        actions
    }

    pub fn on_peer_left(
        &mut self,
        nickname: &str,
        peer_count: u8,
        authority: PeerOrdinal,
    ) -> Vec<LifecycleAction> {
        if !self.state.is_online() {
            debug!(state = ?self.state, "Peer leave ignored");
            return Vec::new();
        }
        self.peer_count = peer_count;
        self.authority = authority;

        let mut actions = if nickname == ROOM_OWNER_NICKNAME {
            info!("Room owner left");
            self.state = SessionState::OwnerLost;
            vec![
                LifecycleAction::LeaveRoom,
                LifecycleAction::ShowPanel(Panel::PlayerLost),
            ]
        } else {
            info!(nickname, "Peer left, waiting for another");
            self.state = SessionState::WaitingForPeer;
            vec![LifecycleAction::ShowPanel(Panel::Waiting)]
        };
        actions.push(LifecycleAction::DisableGenerators);
        actions.push(LifecycleAction::CleanScene);
        actions
    }

    pub fn on_disconnected(&mut self) -> Vec<LifecycleAction> {
        if !self.is_connected() {
            return Vec::new();
        }
        info!(state = ?self.state, "Disconnected from relay");
        self.state = SessionState::Disconnected;
        vec![LifecycleAction::ReloadScene]
    }
}
