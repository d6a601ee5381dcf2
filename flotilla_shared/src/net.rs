//! Networking primitives.
//!
//! Goals:
//! - One reliable, ordered TCP channel per peer.
//! - Message types for the lobby and match phases as one tagged union.
//! - Explicit framing: a 10-byte ASCII decimal length header (left-justified,
//!   space padded) followed by exactly that many payload bytes.
//!
//! The payload is JSON of `{"type": ..., "payload": ...}`. It is a trusted-peer
//! format with no cross-version guarantee; the only hardening is a frame size
//! cap so a bogus header cannot trigger a huge allocation.

use std::net::SocketAddr;

use anyhow::Context;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream, ToSocketAddrs,
    },
    sync::Mutex,
};

use crate::state::{Command, GameState, LobbyPlayer, PlayerId};

/// Width of the ASCII length header.
pub const HEADER_LEN: usize = 10;

/// Largest payload accepted in either direction (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Default server port.
pub const DEFAULT_PORT: u16 = 5555;

/// Every message exchanged between client and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    // ─── Server -> client ───
    /// Sent once right after a connection is accepted.
    Welcome { id: PlayerId },
    /// Lobby roster, broadcast periodically until the match starts.
    LobbyUpdate { players: Vec<LobbyPlayer> },
    /// Initial match state, sent exactly once per match.
    StartGame(GameState),
    /// Full state after each simulation tick.
    GameUpdate(GameState),

    // ─── Client -> server ───
    /// Host asks the server to begin the match.
    StartGameRequest,
    /// Replaces the sender's pending command set.
    ClientCommands(Vec<Command>),
}

impl Message {
    /// Short name matching the wire `type` tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Welcome { .. } => "welcome",
            Message::LobbyUpdate { .. } => "lobby_update",
            Message::StartGame(_) => "start_game",
            Message::GameUpdate(_) => "game_update",
            Message::StartGameRequest => "start_game_request",
            Message::ClientCommands(_) => "client_commands",
        }
    }
}

/// Why a frame could not be read.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream before the next header.
    #[error("connection closed by peer")]
    Closed,
    #[error("malformed length header {0:?}")]
    BadHeader(String),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    TooLarge(usize),
    #[error("undecodable payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Formats the length header for a payload of `len` bytes.
pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN], FrameError> {
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    let text = format!("{:<width$}", len, width = HEADER_LEN);
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

/// Parses a length header. Surrounding spaces are ignored.
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize, FrameError> {
    let bad = || FrameError::BadHeader(String::from_utf8_lossy(header).into_owned());
    let text = std::str::from_utf8(header).map_err(|_| bad())?;
    let len: usize = text.trim().parse().map_err(|_| bad())?;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    Ok(len)
}

/// Serializes a message into a complete frame (header + payload).
pub fn encode_frame(msg: &Message) -> Result<Bytes, FrameError> {
    let payload = serde_json::to_vec(msg)?;
    let header = encode_header(payload.len())?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&header);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Deserializes a frame payload (without header).
pub fn decode_payload(payload: &[u8]) -> Result<Message, FrameError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Reads exactly one frame: the header, then exactly the announced payload.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(e.into()),
    }
    let len = parse_header(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload)
}

/// Writes one frame and flushes it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> anyhow::Result<()> {
    let frame = encode_frame(msg).context("encode frame")?;
    writer.write_all(&frame).await.context("tcp write")?;
    writer.flush().await.context("tcp flush")?;
    Ok(())
}

/// Destination for already-encoded frames.
///
/// The server encodes a broadcast once; each connection's writer task hands
/// the same bytes to its sink.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_frame(&self, frame: &[u8]) -> anyhow::Result<()>;

    async fn send(&self, msg: &Message) -> anyhow::Result<()> {
        let frame = encode_frame(msg).context("encode frame")?;
        self.send_frame(&frame).await
    }

    /// Ends the outbound stream. Nothing to do by default.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
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

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, msg: &Message) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> Result<Message, FrameError> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into an inbound reader and a lockable outbound writer so one
    /// task can block on reads while others send.
    pub fn into_split(self) -> anyhow::Result<(ConnReader, ConnWriter)> {
        let peer = self.peer_addr()?;
        let (read, write) = self.stream.into_split();
        Ok((
            ConnReader { half: read },
            ConnWriter {
                half: Mutex::new(write),
                peer,
            },
        ))
    }
}

/// Inbound half of a connection.
#[derive(Debug)]
pub struct ConnReader {
    half: OwnedReadHalf,
}

impl ConnReader {
    pub async fn recv(&mut self) -> Result<Message, FrameError> {
        read_frame(&mut self.half).await
    }
}

/// Outbound half of a connection. Writes are serialized by an internal lock
/// so frames from concurrent senders never interleave.
#[derive(Debug)]
pub struct ConnWriter {
    half: Mutex<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl ConnWriter {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Closes the outbound direction; the peer observes EOF.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let mut half = self.half.lock().await;
        half.shutdown().await.context("tcp shutdown")?;
        Ok(())
    }
}

#[async_trait]
impl MessageSink for ConnWriter {
    async fn send_frame(&self, frame: &[u8]) -> anyhow::Result<()> {
        let mut half = self.half.lock().await;
        half.write_all(frame).await.context("tcp write")?;
        half.flush().await.context("tcp flush")?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.shutdown().await
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("tcp bind {addr}"))?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::UnitKind, math::Vec2, state::Unit, state::UnitId};

    fn sample_state() -> GameState {
        let mut state = GameState::new(4242);
        for (i, kind) in UnitKind::ALL.into_iter().enumerate() {
            let id = UnitId(i as u32 + 1);
            state
                .units
                .insert(id, Unit::spawn(id, kind, PlayerId(1), Vec2::new(10.0 * i as f32, 5.0)));
        }
        state.turn_number = 3;
        state
    }

    fn all_messages() -> Vec<Message> {
        vec![
            Message::Welcome { id: PlayerId(1) },
            Message::LobbyUpdate {
                players: vec![
                    LobbyPlayer {
                        id: PlayerId(1),
                        addr: "127.0.0.1:40001".into(),
                    },
                    LobbyPlayer {
                        id: PlayerId(2),
                        addr: "127.0.0.1:40002".into(),
                    },
                ],
            },
            Message::StartGameRequest,
            Message::StartGame(sample_state()),
            Message::ClientCommands(vec![Command::move_to(UnitId(3), Vec2::new(1.0, 2.0))]),
            Message::GameUpdate(sample_state()),
        ]
    }

    #[test]
    fn header_is_left_justified_ascii() {
        assert_eq!(&encode_header(42).unwrap(), b"42        ");
        assert_eq!(parse_header(b"42        ").unwrap(), 42);
        assert_eq!(parse_header(b"  7       ").unwrap(), 7);
    }

    #[test]
    fn header_rejects_garbage_and_oversize() {
        assert!(matches!(parse_header(b"abc       "), Err(FrameError::BadHeader(_))));
        assert!(matches!(parse_header(b"          "), Err(FrameError::BadHeader(_))));
        assert!(matches!(parse_header(b"999999999 "), Err(FrameError::TooLarge(_))));
        assert!(matches!(encode_header(MAX_FRAME_LEN + 1), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn wire_shape_is_type_and_payload() {
        let v = serde_json::to_value(Message::Welcome { id: PlayerId(5) }).unwrap();
        assert_eq!(v, serde_json::json!({"type": "welcome", "payload": {"id": 5}}));

        let v = serde_json::to_value(Message::StartGameRequest).unwrap();
        assert_eq!(v["type"], "start_game_request");

        let v = serde_json::to_value(Message::ClientCommands(vec![])).unwrap();
        assert_eq!(v, serde_json::json!({"type": "client_commands", "payload": []}));
    }

    #[tokio::test]
    async fn every_message_survives_a_frame() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        for msg in all_messages() {
            write_frame(&mut a, &msg).await.unwrap();
            let back = read_frame(&mut b).await.unwrap();
            assert_eq!(back, msg, "{} changed in transit", msg.kind());
        }
    }

    #[tokio::test]
    async fn frame_length_matches_payload() {
        let frame = encode_frame(&Message::StartGameRequest).unwrap();
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&frame[..HEADER_LEN]);
        assert_eq!(parse_header(&header).unwrap(), frame.len() - HEADER_LEN);
    }

    #[tokio::test]
    async fn split_writes_are_reassembled() {
        let frame = encode_frame(&Message::Welcome { id: PlayerId(9) }).unwrap();
        let (mut a, mut b) = tokio::io::duplex(1024);
        let reader = tokio::spawn(async move { read_frame(&mut b).await });
        for chunk in frame.chunks(3) {
            a.write_all(chunk).await.unwrap();
            tokio::task::yield_now().await;
        }
        let msg = reader.await.unwrap().unwrap();
        assert_eq!(msg, Message::Welcome { id: PlayerId(9) });
    }

    #[tokio::test]
    async fn eof_before_header_is_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn undecodable_payload_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(b"5         hello").await.unwrap();
        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Decode(_))));
    }
}
