//! Client implementation.
//!
//! The client maintains:
//! - One reliable stream to the server, split into a reader and a writer
//! - A background receive task feeding a bounded inbound queue
//! - The `welcome` id, consumed internally and never queued
//!
//! The queue preserves the server's send order: the stream transport
//! delivers in order and the receive task is its only producer.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use flotilla_shared::{
    config::ClientConfig,
    net::{ConnReader, ConnWriter, FrameError, Message, MessageSink, ReliableConn},
    state::{Command, PlayerId},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// High-level game client.
pub struct GameClient {
    writer: Arc<ConnWriter>,
    inbox: mpsc::Receiver<Message>,
    welcome: watch::Receiver<Option<PlayerId>>,
    connected: Arc<AtomicBool>,
    recv_task: JoinHandle<()>,
}

impl GameClient {
    /// Connects to the server and starts the receive task. Does not wait for
    /// the `welcome`; see [`GameClient::wait_for_welcome`].
    pub async fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        info!(server = %cfg.server_addr, "Connecting to server");
        let conn = ReliableConn::connect(cfg.server_addr.as_str())
            .await
            .with_context(|| format!("connect to {}", cfg.server_addr))?;
        let (reader, writer) = conn.into_split()?;

        let (tx, inbox) = mpsc::channel(cfg.inbound_capacity.max(1));
        let (welcome_tx, welcome) = watch::channel(None);
        let connected = Arc::new(AtomicBool::new(true));
        let recv_task = tokio::spawn(receive_loop(reader, tx, welcome_tx, Arc::clone(&connected)));

        Ok(Self {
            writer: Arc::new(writer),
            inbox,
            welcome,
            connected,
            recv_task,
        })
    }

    /// Identity assigned by the server, once the `welcome` has arrived.
    pub fn player_id(&self) -> Option<PlayerId> {
        *self.welcome.borrow()
    }

    /// Waits until the server has assigned an identity.
    pub async fn wait_for_welcome(&self, timeout: Duration) -> anyhow::Result<PlayerId> {
        let mut rx = self.welcome.clone();
        let id = tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
            .await
            .context("timed out waiting for welcome")?
            .map(|id| *id)
            .context("connection closed before welcome")?;
        id.context("welcome without id")
    }

    pub async fn send(&self, msg: &Message) -> anyhow::Result<()> {
        if let Err(e) = self.writer.send(msg).await {
            self.connected.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Replaces this player's pending command set on the server.
    pub async fn send_commands(&self, commands: Vec<Command>) -> anyhow::Result<()> {
        self.send(&Message::ClientCommands(commands)).await
    }

    pub async fn request_start(&self) -> anyhow::Result<()> {
        self.send(&Message::StartGameRequest).await
    }

    /// Takes everything queued so far, in receive order, without waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            out.push(msg);
        }
        out
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.inbox.try_recv().ok()
    }

    /// Waits up to `timeout` for the next inbound message.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.inbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// False once the stream has failed in either direction.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Closes the outbound direction. The server sees EOF, removes the
    /// player and closes its side, which ends the receive task.
    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.connected.store(false, Ordering::Release);
        self.writer.shutdown().await
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(
    mut reader: ConnReader,
    tx: mpsc::Sender<Message>,
    welcome: watch::Sender<Option<PlayerId>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match reader.recv().await {
            Ok(Message::Welcome { id }) => {
                info!(player_id = %id, "Welcomed by server");
                welcome.send_replace(Some(id));
            }
            Ok(msg) => {
                // A full queue pushes back on the stream rather than dropping.
                if tx.send(msg).await.is_err() {
                    debug!("Inbound queue closed");
                    break;
                }
            }
            Err(FrameError::Closed) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Connection lost");
                break;
            }
        }
    }
    connected.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_shared::{
        math::Vec2,
        net::ReliableListener,
        state::{LobbyPlayer, UnitId},
    };

    async fn listener() -> (ReliableListener, ClientConfig) {
        let listener = ReliableListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let cfg = ClientConfig {
            server_addr: listener.local_addr().unwrap().to_string(),
            inbound_capacity: 8,
            ..Default::default()
        };
        (listener, cfg)
    }

    #[tokio::test]
    async fn welcome_is_consumed_and_not_queued() {
        let (listener, cfg) = listener().await;
        let mut client = GameClient::connect(&cfg).await.unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();

        server_side.send(&Message::Welcome { id: PlayerId(3) }).await.unwrap();
        let lobby = Message::LobbyUpdate {
            players: vec![LobbyPlayer {
                id: PlayerId(3),
                addr: "127.0.0.1:1".into(),
            }],
        };
        server_side.send(&lobby).await.unwrap();

        let id = client.wait_for_welcome(Duration::from_secs(2)).await.unwrap();
        assert_eq!(id, PlayerId(3));
        assert_eq!(client.player_id(), Some(PlayerId(3)));
        assert_eq!(client.recv_timeout(Duration::from_secs(2)).await, Some(lobby));
        assert!(client.drain().is_empty());
    }

    #[tokio::test]
    async fn outbound_messages_reach_the_server_in_order() {
        let (listener, cfg) = listener().await;
        let client = GameClient::connect(&cfg).await.unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();

        let orders = vec![Command::move_to(UnitId(4), Vec2::new(1.0, 2.0))];
        client.send_commands(orders.clone()).await.unwrap();
        client.request_start().await.unwrap();

        assert_eq!(server_side.recv().await.unwrap(), Message::ClientCommands(orders));
        assert_eq!(server_side.recv().await.unwrap(), Message::StartGameRequest);
    }

    #[tokio::test]
    async fn server_close_marks_disconnected() {
        let (listener, cfg) = listener().await;
        let client = GameClient::connect(&cfg).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        drop(server_side);

        assert!(client.wait_for_welcome(Duration::from_secs(2)).await.is_err());
        for _ in 0..100 {
            if !client.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!client.is_connected());
    }
}
