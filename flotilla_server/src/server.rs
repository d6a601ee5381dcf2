//! Server implementation.
//!
//! Task layout:
//! - The accept loop admits peers, queues `welcome` and spawns one reader
//!   and one writer task per connection.
//! - Each reader task blocks on inbound frames and applies them to the
//!   session. Any read error (EOF, bad header, undecodable payload) removes
//!   the player, as does the writer stopping.
//! - Each writer task drains that connection's outbound queue into the
//!   socket (see `outbound`).
//! - One scheduler task broadcasts the lobby roster until the match starts,
//!   then runs the fixed-period simulation tick.
//!
//! All shared state lives in one `Session` behind one mutex. A tick holds
//! that lock from drain to broadcast, so clients never see a half-applied
//! tick and a disconnect during a tick waits until the tick is done. Nothing
//! awaits a socket while holding it.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use flotilla_shared::{
    config::ServerConfig,
    net::{ConnReader, FrameError, Message, ReliableListener},
    state::PlayerId,
    world::WorldSource,
};
use tokio::{
    sync::{oneshot, Mutex, Notify},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{outbound::Outbound, session::Session};

/// Game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    listener: ReliableListener,
    session: Arc<Mutex<Session>>,
    /// Wakes the scheduler as soon as the match starts.
    started: Arc<Notify>,
}

impl GameServer {
    /// Binds the listening socket. Failure here is fatal to startup.
    pub async fn bind(cfg: ServerConfig, worlds: Arc<dyn WorldSource>) -> anyhow::Result<Self> {
        let addr = cfg.bind_addr()?;
        let listener = ReliableListener::bind(addr).await?;
        let session = Session::new(cfg.max_players, worlds);
        Ok(Self {
            cfg,
            listener,
            session: Arc::new(Mutex::new(session)),
            started: Arc::new(Notify::new()),
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared session handle, mostly for inspection in tests.
    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    /// Runs the accept loop and the scheduler until the future is dropped.
    pub async fn run(self) -> anyhow::Result<()> {
        let scheduler = run_scheduler(
            Arc::clone(&self.session),
            Arc::clone(&self.started),
            self.cfg.lobby_period(),
            self.cfg.tick_period(),
        );
        tokio::select! {
            _ = scheduler => {}
            _ = self.accept_loop() => {}
        }
        Ok(())
    }

    async fn accept_loop(&self) {
        loop {
            if let Err(e) = self.accept_one().await {
                warn!(error = %e, "Accept failed");
            }
        }
    }

    /// Accepts one peer. Returns `None` if it was refused.
    pub async fn accept_one(&self) -> anyhow::Result<Option<PlayerId>> {
        let (conn, peer) = self.listener.accept().await?;
        let (reader, writer) = conn.into_split()?;

        let mut session = self.session.lock().await;
        if let Some(refused) = session.admission() {
            drop(session);
            info!(%peer, reason = %refused, "Refused connection");
            if let Err(e) = writer.shutdown().await {
                debug!(%peer, error = %e, "Shutdown failed");
            }
            return Ok(None);
        }

        let (outbound, writer_done) = Outbound::spawn(
            writer,
            peer,
            self.cfg.outbound_queue,
            self.cfg.write_timeout(),
        );
        let id = session.join(peer.to_string(), outbound.clone())?;
        // Queued under the lock so no broadcast can overtake it.
        if let Err(e) = outbound.push_message(&Message::Welcome { id }) {
            warn!(player_id = %id, %peer, error = %e, "Welcome failed");
            session.leave(id);
            return Ok(None);
        }
        drop(session);

        info!(player_id = %id, %peer, "Accepted connection");
        tokio::spawn(handle_connection(
            Arc::clone(&self.session),
            Arc::clone(&self.started),
            id,
            reader,
            writer_done,
        ));
        Ok(Some(id))
    }
}

/// Reads frames from one peer until the stream fails or its writer stops,
/// then unregisters it.
async fn handle_connection(
    session: Arc<Mutex<Session>>,
    started: Arc<Notify>,
    id: PlayerId,
    mut reader: ConnReader,
    mut writer_done: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            next = reader.recv() => next,
            _ = &mut writer_done => {
                info!(player_id = %id, "Writer stopped, dropping connection");
                break;
            }
        };
        let msg = match next {
            Ok(msg) => msg,
            Err(FrameError::Closed) => {
                info!(player_id = %id, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(player_id = %id, error = %e, "Dropping connection");
                break;
            }
        };

        let mut session = session.lock().await;
        match msg {
            Message::ClientCommands(commands) => {
                debug!(player_id = %id, count = commands.len(), "Commands received");
                session.submit(id, commands);
            }
            Message::StartGameRequest => {
                if let Some(start) = session.request_start(id, rand::random()) {
                    session.broadcast(&start);
                    started.notify_one();
                }
            }
            other => debug!(player_id = %id, kind = other.kind(), "Unexpected message ignored"),
        }
    }

    let mut session = session.lock().await;
    session.leave(id);
}

/// Lobby broadcasts until the match starts, then fixed-period ticks.
async fn run_scheduler(
    session: Arc<Mutex<Session>>,
    started: Arc<Notify>,
    lobby_period: Duration,
    tick_period: Duration,
) {
    loop {
        {
            let mut session = session.lock().await;
            match session.lobby_update() {
                Some(update) => {
                    session.broadcast(&update);
                }
                None => break,
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(lobby_period) => {}
            _ = started.notified() => {}
        }
    }

    info!(tick_period_ms = tick_period.as_millis() as u64, "Simulation running");
    let mut deadline = Instant::now() + tick_period;
    loop {
        tokio::time::sleep_until(deadline).await;
        let tick_start = Instant::now();
        {
            let mut session = session.lock().await;
            if let Some(update) = session.tick() {
                session.broadcast(&update);
            }
        }
        let elapsed = tick_start.elapsed();
        if elapsed > tick_period {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "Tick overran its period");
        }
        // No catch-up: an overrun tick is followed immediately by the next.
        deadline = tick_start + tick_period;
    }
}

/// Helper for tests: bind to an ephemeral loopback port.
pub async fn bind_ephemeral(
    cfg: ServerConfig,
    worlds: Arc<dyn WorldSource>,
) -> anyhow::Result<(GameServer, SocketAddr)> {
    let cfg = ServerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST).to_string(),
        port: 0,
        ..cfg
    };
    let server = GameServer::bind(cfg, worlds).await?;
    let addr = server.local_addr()?;
    Ok((server, addr))
}
