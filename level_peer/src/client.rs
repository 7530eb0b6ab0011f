//! Relay connection.
//!
//! [`RelayLink`] is the seam between the peer driver and the transport.
//! [`PeerClient`] is the TCP implementation: after the handshake a reader
//! task decodes frames into a channel so the driver can poll without
//! blocking its tick. [`ChannelLink`] is an in-process stand-in.

use std::net::SocketAddr;

use anyhow::Context;
use async_trait::async_trait;
use level_shared::{
    entity::PeerOrdinal,
    net::{FrameWriter, NetMsg, ReliableConn, PROTOCOL_VERSION},
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info};

/// Result of polling a link for inbound traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkPoll {
    Message(NetMsg),
    Empty,
    Closed,
}

#[async_trait]
pub trait RelayLink: Send {
    async fn send(&mut self, msg: NetMsg) -> anyhow::Result<()>;

    /// Next inbound message, without waiting.
    fn poll_recv(&mut self) -> LinkPoll;
}

fn poll_channel(rx: &mut mpsc::UnboundedReceiver<NetMsg>) -> LinkPoll {
    match rx.try_recv() {
        Ok(msg) => LinkPoll::Message(msg),
        Err(TryRecvError::Empty) => LinkPoll::Empty,
        Err(TryRecvError::Disconnected) => LinkPoll::Closed,
    }
}

/// What the relay told us when we joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub ordinal: PeerOrdinal,
    pub nickname: String,
    pub peer_count: u8,
    pub authority: PeerOrdinal,
}

/// TCP connection to the relay.
pub struct PeerClient {
    pub room: RoomInfo,
    writer: FrameWriter,
    inbound: mpsc::UnboundedReceiver<NetMsg>,
    relay: SocketAddr,
}

impl PeerClient {
    /// Connects and joins the relay's room.
    pub async fn connect(relay: SocketAddr) -> anyhow::Result<Self> {
        info!(%relay, "Connecting to relay");
        let mut conn = ReliableConn::connect(relay).await.context("connect relay")?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let room = match conn.recv().await.context("await welcome")? {
            NetMsg::Welcome {
                ordinal,
                nickname,
                peer_count,
                authority,
            } => RoomInfo {
                ordinal,
                nickname,
                peer_count,
                authority,
            },
            NetMsg::Disconnect { reason } => anyhow::bail!("relay refused join: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };
        info!(ordinal = ?room.ordinal, peer_count = room.peer_count, "Joined room");

        let (mut reader, writer) = conn.into_split();
        let (tx, inbound) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Relay stream ended");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            room,
            writer,
            inbound,
            relay,
        })
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay
    }
}

#[async_trait]
impl RelayLink for PeerClient {
    async fn send(&mut self, msg: NetMsg) -> anyhow::Result<()> {
        self.writer.send(&msg).await
    }

    fn poll_recv(&mut self) -> LinkPoll {
        poll_channel(&mut self.inbound)
    }
}

/// In-process link backed by a pair of channels.
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<NetMsg>,
    rx: mpsc::UnboundedReceiver<NetMsg>,
}

impl ChannelLink {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    /// Everything the other end has sent so far.
    pub fn drain(&mut self) -> Vec<NetMsg> {
        let mut out = Vec::new();
        while let LinkPoll::Message(msg) = poll_channel(&mut self.rx) {
            out.push(msg);
        }
        out
    }
}

#[async_trait]
impl RelayLink for ChannelLink {
    async fn send(&mut self, msg: NetMsg) -> anyhow::Result<()> {
        self.tx.send(msg).map_err(|_| anyhow::anyhow!("link closed"))
    }

    fn poll_recv(&mut self) -> LinkPoll {
        poll_channel(&mut self.rx)
    }
}
