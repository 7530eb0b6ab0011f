//! Relay implementation.
//!
//! One TCP connection per peer. Each fresh connection gets a handshake task
//! that waits for `Hello` off the relay loop; admitted connections get a
//! reader task. Both forward into a single mpsc channel. The relay loop owns
//! the room and every write half, so no state is shared between tasks.
//!
//! Connection flow:
//! 1. Peer sends `Hello { protocol }` (checked by the handshake task).
//! 2. Relay answers `Welcome` (or `Disconnect` when the room is full).
//! 3. Cached creation calls are replayed as `Deliver`.
//! 4. Everyone else receives `PeerJoined`.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use level_shared::{
    entity::PeerOrdinal,
    net::{FrameWriter, NetMsg, ReliableConn, ReliableListener, PROTOCOL_VERSION},
    room::{Room, RoomMember},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a fresh connection has to say `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed `accept` so a persistent error doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Identifies one accepted connection, so a late close from a previous
/// holder of an ordinal can't evict its successor.
type ConnId = u64;

#[derive(Debug)]
enum Inbound {
    /// Said a valid `Hello`, waiting for a seat.
    Pending {
        conn: ReliableConn,
        addr: SocketAddr,
    },
    Message {
        conn: ConnId,
        from: PeerOrdinal,
        msg: NetMsg,
    },
    Closed {
        conn: ConnId,
        from: PeerOrdinal,
    },
}

struct PeerLink {
    conn: ConnId,
    writer: FrameWriter,
    addr: SocketAddr,
}

/// The room relay.
pub struct RelayServer {
    listener: ReliableListener,
    room: Room,
    peers: HashMap<PeerOrdinal, PeerLink>,
    next_conn: ConnId,
    handshake_timeout: Duration,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
}

impl RelayServer {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = ReliableListener::bind(addr)
            .await
            .with_context(|| format!("bind relay on {addr}"))?;
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        Ok(Self {
            listener,
            room: Room::new(),
            peers: HashMap::new(),
            next_conn: 0,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            inbound_tx,
            inbound_rx,
        })
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Serves connections forever.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    self.on_accept(accepted).await;
                }
                Some(inbound) = self.inbound_rx.recv() => {
                    self.on_inbound(inbound).await;
                }
            }
        }
    }

    async fn on_accept(&mut self, accepted: anyhow::Result<(ReliableConn, SocketAddr)>) {
        match accepted {
            Ok((conn, addr)) => self.spawn_handshake(conn, addr),
            Err(e) => {
                warn!(error = ?e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    fn spawn_handshake(&self, mut conn: ReliableConn, addr: SocketAddr) {
        let tx = self.inbound_tx.clone();
        let timeout = self.handshake_timeout;
        tokio::spawn(async move {
            match handshake(&mut conn, timeout).await {
                Ok(()) => {
                    let _ = tx.send(Inbound::Pending { conn, addr }).await;
                }
                Err(e) => warn!(%addr, error = %e, "Handshake failed"),
            }
        });
    }

    /// Seats a connection that passed the handshake. The ordinal is given
    /// back if the welcome can't be delivered.
    async fn admit(&mut self, mut conn: ReliableConn, addr: SocketAddr) {
        let member = match self.room.join() {
            Ok(member) => member,
            Err(e) => {
                info!(%addr, error = %e, "Rejecting peer");
                let refusal = NetMsg::Disconnect {
                    reason: e.to_string(),
                };
                if let Err(e) = conn.send(&refusal).await {
                    debug!(%addr, error = %e, "Refusal not delivered");
                }
                return;
            }
        };
        let ordinal = member.ordinal;
        let peer_count = self.room.peer_count();

        if let Err(e) = self.welcome(&mut conn, &member).await {
            warn!(?ordinal, %addr, error = %e, "Welcome failed, releasing ordinal");
            if let Err(e) = self.room.leave(ordinal) {
                warn!(?ordinal, error = %e, "Release of unseated peer failed");
            }
            return;
        }

        let conn_id = self.next_conn;
        self.next_conn += 1;
        let (mut reader, writer) = conn.into_split();
        let tx = self.inbound_tx.clone();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        let inbound = Inbound::Message {
                            conn: conn_id,
                            from: ordinal,
                            msg,
                        };
                        if tx.send(inbound).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(?ordinal, error = %e, "Peer stream ended");
                        let _ = tx
                            .send(Inbound::Closed {
                                conn: conn_id,
                                from: ordinal,
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        self.peers.insert(
            ordinal,
            PeerLink {
                conn: conn_id,
                writer,
                addr,
            },
        );
        info!(?ordinal, %addr, peer_count, "Peer joined");

        self.broadcast_except(
            ordinal,
            &NetMsg::PeerJoined {
                ordinal,
                nickname: member.nickname,
                peer_count,
            },
        )
        .await;
    }

    async fn welcome(&self, conn: &mut ReliableConn, member: &RoomMember) -> anyhow::Result<()> {
        conn.send(&NetMsg::Welcome {
            ordinal: member.ordinal,
            nickname: member.nickname.clone(),
            peer_count: self.room.peer_count(),
            authority: self.room.authority(),
        })
        .await
        .context("send welcome")?;
        for (from, call) in self.room.cached_calls() {
            conn.send(&NetMsg::Deliver { from, call })
                .await
                .context("replay cached call")?;
        }
        Ok(())
    }

    async fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Pending { conn, addr } => self.admit(conn, addr).await,
            Inbound::Message { conn, from, msg } => {
                if !self.is_current(from, conn) {
                    return;
                }
                self.route(from, msg).await;
            }
            Inbound::Closed { conn, from } => {
                if self.is_current(from, conn) {
                    self.remove_peer(from).await;
                }
            }
        }
    }

    fn is_current(&self, ordinal: PeerOrdinal, conn: ConnId) -> bool {
        self.peers.get(&ordinal).is_some_and(|p| p.conn == conn)
    }

    async fn route(&mut self, from: PeerOrdinal, msg: NetMsg) {
        match msg {
            NetMsg::Call { target, call } => {
                self.room.record(from, target, &call);
                for to in self.room.route(from, target) {
                    self.send_to(
                        to,
                        &NetMsg::Deliver {
                            from,
                            call: call.clone(),
                        },
                    )
                    .await;
                }
            }
            msg @ NetMsg::Replicate { .. } => {
                self.broadcast_except(from, &msg).await;
            }
            NetMsg::Disconnect { reason } => {
                info!(?from, %reason, "Peer leaving");
                self.remove_peer(from).await;
            }
            other => debug!(?from, ?other, "Unexpected message from peer"),
        }
    }

    async fn remove_peer(&mut self, ordinal: PeerOrdinal) {
        let Some(link) = self.peers.remove(&ordinal) else {
            return;
        };
        let member = match self.room.leave(ordinal) {
            Ok(member) => member,
            Err(e) => {
                warn!(?ordinal, error = %e, "Leave for unknown peer");
                return;
            }
        };
        let peer_count = self.room.peer_count();
        info!(?ordinal, addr = %link.addr, peer_count, "Peer left");
        self.broadcast_except(
            ordinal,
            &NetMsg::PeerLeft {
                ordinal,
                nickname: member.nickname,
                peer_count,
                authority: self.room.authority(),
            },
        )
        .await;
    }

    async fn send_to(&mut self, to: PeerOrdinal, msg: &NetMsg) {
        let Some(link) = self.peers.get_mut(&to) else {
            return;
        };
        if let Err(e) = link.writer.send(msg).await {
            // The reader task reports the close.
            warn!(ordinal = ?to, error = %e, "Send to peer failed");
        }
    }

    async fn broadcast_except(&mut self, except: PeerOrdinal, msg: &NetMsg) {
        let targets: Vec<PeerOrdinal> = self
            .room
            .members()
            .iter()
            .map(|m| m.ordinal)
            .filter(|o| *o != except)
            .collect();
        for to in targets {
            self.send_to(to, msg).await;
        }
    }
}

/// Waits for a compatible `Hello`. A version mismatch is answered with
/// `Disconnect` before failing.
async fn handshake(conn: &mut ReliableConn, timeout: Duration) -> anyhow::Result<()> {
    let hello = tokio::time::timeout(timeout, conn.recv())
        .await
        .context("hello timed out")??;
    match hello {
        NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => Ok(()),
        NetMsg::Hello { protocol } => {
            conn.send(&NetMsg::Disconnect {
                reason: format!("protocol {protocol} unsupported"),
            })
            .await?;
            anyhow::bail!("protocol mismatch: {protocol}")
        }
        other => anyhow::bail!("expected Hello, got {other:?}"),
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral() -> anyhow::Result<(RelayServer, SocketAddr)> {
    let relay = RelayServer::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
    let addr = relay.local_addr()?;
    Ok((relay, addr))
}
