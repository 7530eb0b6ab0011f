//! Session score ledger.
//!
//! Every peer keeps a [`ScoreBoard`] mirror for display. Only the authority
//! decides that a coin was collected: collection requests are routed to it,
//! it checks the coin still exists, destroys it, and broadcasts the score
//! change. The first request for a coin wins; later ones find nothing to
//! destroy and do nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    entity::{EntityCategory, NetworkId, PeerOrdinal},
    net::{CallTarget, Outgoing, RemoteCall, Sound},
    objects::NetworkObjects,
};

/// Per-player coin counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub player1: u32,
    pub player2: u32,
}

impl ScoreBoard {
    pub fn get(&self, is_player1: bool) -> u32 {
        if is_player1 {
            self.player1
        } else {
            self.player2
        }
    }

    fn slot_mut(&mut self, is_player1: bool) -> &mut u32 {
        if is_player1 {
            &mut self.player1
        } else {
            &mut self.player2
        }
    }

    pub fn increment(&mut self, is_player1: bool) {
        let slot = self.slot_mut(is_player1);
        *slot = slot.saturating_add(1);
    }

    pub fn reset(&mut self, is_player1: bool) {
        *self.slot_mut(is_player1) = 0;
    }
}

#[derive(Debug, Default)]
pub struct SessionScoreLedger {
    scores: ScoreBoard,
}

impl SessionScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scores(&self) -> ScoreBoard {
        self.scores
    }

    /// Authority side of a collection request.
    ///
    /// Returns the follow-up calls to issue, or `None` when the coin was
    /// already destroyed.
    pub fn destroy_collectible(
        &mut self,
        id: NetworkId,
        collector: PeerOrdinal,
        objects: &mut NetworkObjects,
    ) -> Option<Vec<Outgoing>> {
        let is_coin = objects
            .get(id)
            .is_some_and(|o| o.entity.category == EntityCategory::Coin);
        if !is_coin || !objects.destroy(id) {
            debug!(?id, ?collector, "Collectible already gone");
            return None;
        }

        let mut out = vec![Outgoing::new(
            CallTarget::Others,
            RemoteCall::DestroyNetworkObject { id },
        )];
        if let Some(is_player1) = collector.score_slot() {
            info!(?id, ?collector, "Coin collected");
            out.push(Outgoing::new(
                CallTarget::All,
                RemoteCall::IncrementScore { is_player1 },
            ));
            out.push(Outgoing::new(
                CallTarget::All,
                RemoteCall::PlaySound { sound: Sound::Coin },
            ));
        } else {
            debug!(?id, "Coin removed without collector");
        }
        Some(out)
    }

    pub fn apply_increment(&mut self, is_player1: bool) -> ScoreBoard {
        self.scores.increment(is_player1);
        self.scores
    }

    pub fn apply_reset(&mut self, is_player1: bool) -> ScoreBoard {
        self.scores.reset(is_player1);
        self.scores
    }
}
