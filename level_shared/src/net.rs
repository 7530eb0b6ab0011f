//! Networking primitives.
//!
//! Goals:
//! - One reliable, ordered channel (TCP) between each peer and the relay.
//! - A closed set of remote calls instead of name-addressed handlers.
//! - Keep serialization explicit and versionable.
//!
//! Frames are a big-endian `u32` length followed by a JSON payload.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::{
    entity::{NetworkId, PeerOrdinal},
    math::Vec2,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame, to refuse garbage length prefixes.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Sound cues the level can ask every peer to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sound {
    Coin,
    Hurt,
}

/// Who a remote call is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    /// Every peer in the room, sender included, via the relay.
    All,
    /// Every peer except the sender.
    Others,
    /// Only the authority peer.
    Authority,
    /// Room-object creation: every peer, cached for late joiners.
    RoomObject,
}

/// Remote calls, each with a fixed argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteCall {
    InstantiateEnemy {
        position: Vec2,
    },
    InstantiateMissile {
        position: Vec2,
    },
    InstantiateCoin {
        id: NetworkId,
        position: Vec2,
    },
    /// A peer's avatar entering the level.
    InstantiatePlayer {
        id: NetworkId,
        ordinal: PeerOrdinal,
        position: Vec2,
    },
    /// Replicated destruction of a networked entity.
    DestroyNetworkObject {
        id: NetworkId,
    },
    /// Collection (or cleanup, with `collector` 0) request for the authority.
    DestroyCoinOnAuthority {
        id: NetworkId,
        collector: PeerOrdinal,
    },
    IncrementScore {
        is_player1: bool,
    },
    ResetScore {
        is_player1: bool,
    },
    PlaySound {
        sound: Sound,
    },
    EnableGenerators,
}

impl RemoteCall {
    /// Id of the networked entity this call creates, if any.
    pub fn created_id(&self) -> Option<NetworkId> {
        match self {
            RemoteCall::InstantiateCoin { id, .. } | RemoteCall::InstantiatePlayer { id, .. } => {
                Some(*id)
            }
            _ => None,
        }
    }
}

/// A remote call waiting to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    pub target: CallTarget,
    pub call: RemoteCall,
}

impl Outgoing {
    pub fn new(target: CallTarget, call: RemoteCall) -> Self {
        Self { target, call }
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    /// Relay -> joining peer.
    Welcome {
        ordinal: PeerOrdinal,
        nickname: String,
        peer_count: u8,
        authority: PeerOrdinal,
    },

    // ─── Room membership ───
    PeerJoined {
        ordinal: PeerOrdinal,
        nickname: String,
        peer_count: u8,
    },
    PeerLeft {
        ordinal: PeerOrdinal,
        nickname: String,
        peer_count: u8,
        authority: PeerOrdinal,
    },

    // ─── Remote calls ───
    /// Peer -> relay.
    Call {
        target: CallTarget,
        call: RemoteCall,
    },
    /// Relay -> peer.
    Deliver {
        from: PeerOrdinal,
        call: RemoteCall,
    },

    // ─── Replication ───
    /// Player snapshot, forwarded by the relay to the non-owning peer.
    Replicate {
        id: NetworkId,
        fields: [f32; 6],
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

fn frame(msg: &NetMsg) -> anyhow::Result<BytesMut> {
    let payload = encode_to_bytes(msg)?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let buf = frame(msg)?;
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { read }, FrameWriter { write })
    }
}

async fn read_frame<R: AsyncRead + Unpin>(read: &mut R) -> anyhow::Result<NetMsg> {
    let mut len_buf = [0u8; 4];
    read.read_exact(&mut len_buf)
        .await
        .context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame too large: {len} bytes");
    let mut payload = vec![0u8; len];
    read.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    decode_from_bytes(&payload)
}

/// Read half of a split [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    read: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.read).await
    }
}

/// Write half of a split [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    write: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let buf = frame(msg)?;
        self.write.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Payload codec shared by both ends of a frame.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}
