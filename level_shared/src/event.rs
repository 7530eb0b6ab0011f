//! Level events.
//!
//! The level reports what its external collaborators (audio, UI panels,
//! scene loader, score labels) should do by pushing typed events onto an
//! [`EventBus`]. Sound cues go on the bus as [`Sound`](crate::net::Sound)
//! values, everything else as [`LevelEvent`].

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::{entity::PeerOrdinal, ledger::ScoreBoard, math::Vec2, session::Panel};

/// Something the presentation layer should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelEvent {
    ScoreChanged(ScoreBoard),
    HighScoreLoaded(u32),
    PanelShown(Panel),
    PanelHidden(Panel),
    PlayerSpawned { ordinal: PeerOrdinal, position: Vec2 },
    PlayerDied { ordinal: PeerOrdinal },
    GameOver { score: u32, high_score: u32 },
    LeaveRoom,
    ReloadScene,
}

/// Typed event bus.
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an event into the queue for its type.
    pub fn push<E: 'static + Send + Sync>(&mut self, e: E) {
        let q = self
            .queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<E>::new()));
        let q = q.downcast_mut::<Vec<E>>().expect("queue type mismatch");
        q.push(e);
    }

    /// Drains all queued events of a type, oldest first.
    pub fn drain<E: 'static + Send + Sync>(&mut self) -> Vec<E> {
        self.queues
            .remove(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast::<Vec<E>>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_default()
    }

    /// Number of queued events of a type.
    pub fn pending<E: 'static + Send + Sync>(&self) -> usize {
        self.queues
            .get(&TypeId::of::<E>())
            .and_then(|q| q.downcast_ref::<Vec<E>>())
            .map_or(0, Vec::len)
    }
}
