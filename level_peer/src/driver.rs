//! Peer runtime.
//!
//! Drives a [`Level`] on a fixed tick: pull everything the relay delivered,
//! step the simulation, push the outbox and this tick's snapshots, then
//! hand level events to the presentation stand-ins (here: logs).

use std::{collections::HashMap, time::Duration};

use level_shared::{
    entity::NetworkId,
    event::LevelEvent,
    level::Level,
    math::Vec2,
    net::{NetMsg, Sound},
    replication::PlayerSnapshot,
};
use tracing::{debug, info};

use crate::{
    client::{LinkPoll, PeerClient, RelayLink, RoomInfo},
    smoothing::SmoothedPose,
};

/// Gap fraction closed per second by display smoothing.
const SMOOTHING_RATE: f32 = 12.0;

pub struct PeerDriver<L = PeerClient> {
    level: Level,
    link: Option<L>,
    smoothing: HashMap<NetworkId, SmoothedPose>,
    finished: bool,
}

impl<L: RelayLink> PeerDriver<L> {
    /// Offline play: no relay, the level is its own authority.
    pub fn offline(mut level: Level) -> Self {
        level.start_solo();
        Self {
            level,
            link: None,
            smoothing: HashMap::new(),
            finished: false,
        }
    }

    /// Online play in the room described by `room`.
    pub fn online(mut level: Level, link: L, room: &RoomInfo) -> Self {
        level.on_joined_room(room.ordinal, room.peer_count, room.authority);
        Self {
            level,
            link: Some(link),
            smoothing: HashMap::new(),
            finished: false,
        }
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut Level {
        &mut self.level
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// The session is over (room left or scene reload requested).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Smoothed display position of a remote avatar.
    pub fn displayed_position(&self, id: NetworkId) -> Option<Vec2> {
        self.smoothing.get(&id).map(SmoothedPose::displayed)
    }

    pub async fn step(&mut self, dt: Duration) -> anyhow::Result<()> {
        self.pump_inbound();
        self.level.tick(dt);
        self.flush().await?;
        self.present().await?;
        self.smooth(dt);
        Ok(())
    }

    fn pump_inbound(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let mut inbound = Vec::new();
        let mut closed = false;
        loop {
            match link.poll_recv() {
                LinkPoll::Message(msg) => inbound.push(msg),
                LinkPoll::Empty => break,
                LinkPoll::Closed => {
                    closed = true;
                    break;
                }
            }
        }

        for msg in inbound {
            self.on_message(msg);
        }
        if closed && self.link.take().is_some() {
            self.level.on_disconnected();
        }
    }

    fn on_message(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::Deliver { from, call } => self.level.handle_remote(from, call),
            NetMsg::PeerJoined {
                ordinal,
                peer_count,
                ..
            } => self.level.on_peer_joined(ordinal, peer_count),
            NetMsg::PeerLeft {
                ordinal,
                nickname,
                peer_count,
                authority,
            } => self
                .level
                .on_peer_left(ordinal, &nickname, peer_count, authority),
            NetMsg::Replicate { id, fields } => {
                let snapshot = PlayerSnapshot::from_wire(fields);
                if self.level.apply_snapshot(id, snapshot) {
                    self.smoothing
                        .entry(id)
                        .or_insert_with(|| SmoothedPose::new(snapshot.position, SMOOTHING_RATE))
                        .retarget(snapshot.position);
                }
            }
            NetMsg::Disconnect { reason } => {
                info!(%reason, "Relay closed the session");
                self.link = None;
                self.level.on_disconnected();
            }
            other => debug!(?other, "Unhandled relay message"),
        }
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        let outbox = self.level.take_outbox();
        let snapshots = self.level.collect_snapshots();
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        for out in outbox {
            link.send(NetMsg::Call {
                target: out.target,
                call: out.call,
            })
            .await?;
        }
        for (id, snapshot) in snapshots {
            link.send(NetMsg::Replicate {
                id,
                fields: snapshot.to_wire(),
            })
            .await?;
        }
        Ok(())
    }

    async fn present(&mut self) -> anyhow::Result<()> {
        for sound in self.level.events_mut().drain::<Sound>() {
            info!(?sound, "Play sound");
        }
        for event in self.level.events_mut().drain::<LevelEvent>() {
            match event {
                LevelEvent::ScoreChanged(board) => {
                    info!(player1 = board.player1, player2 = board.player2, "Score")
                }
                LevelEvent::GameOver { score, high_score } => {
                    info!(score, high_score, "Game over");
                }
                LevelEvent::LeaveRoom => {
                    if let Some(mut link) = self.link.take() {
                        link.send(NetMsg::Disconnect {
                            reason: "left room".to_string(),
                        })
                        .await?;
                    }
                    info!("Left room");
                    self.finished = true;
                }
                LevelEvent::ReloadScene => {
                    info!("Scene reload requested");
                    self.finished = true;
                }
                other => debug!(?other, "Level event"),
            }
        }
        Ok(())
    }

    fn smooth(&mut self, dt: Duration) {
        let objects = self.level.objects();
        self.smoothing.retain(|id, _| objects.contains(*id));
        for pose in self.smoothing.values_mut() {
            pose.step(dt.as_secs_f32());
        }
    }
}
