//! Shared helpers for the socket-level tests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use flotilla_client::GameClient;
use flotilla_server::{bind_ephemeral, session::Session};
use flotilla_shared::{
    config::{ClientConfig, ServerConfig},
    math::Vec2,
    net::Message,
    state::PlayerId,
    world::{FixedWorld, World, WorldSource},
};
use tokio::{sync::Mutex, task::JoinHandle};

/// Start points of the test map, one per player.
pub const SPAWNS: [Vec2; 4] = [
    Vec2::new(300.0, 300.0),
    Vec2::new(900.0, 900.0),
    Vec2::new(300.0, 900.0),
    Vec2::new(900.0, 300.0),
];

/// A server running in the background for the lifetime of the value.
pub struct TestServer {
    pub addr: SocketAddr,
    /// The running server's session, for inspection.
    pub session: Arc<Mutex<Session>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Server config with short periods so scenarios finish quickly.
pub fn fast_config() -> ServerConfig {
    ServerConfig {
        max_players: 4,
        lobby_period_ms: 250,
        tick_period_ms: 300,
        ..Default::default()
    }
}

/// 1600x1600 px of open water with [`SPAWNS`] as start points.
pub fn open_sea() -> World {
    World::ocean(100, 100).with_spawn_points(SPAWNS.to_vec())
}

pub fn fixed(world: World) -> Arc<dyn WorldSource> {
    Arc::new(FixedWorld(Arc::new(world)))
}

pub async fn spawn_server(
    cfg: ServerConfig,
    worlds: Arc<dyn WorldSource>,
) -> anyhow::Result<TestServer> {
    let (server, addr) = bind_ephemeral(cfg, worlds).await?;
    let session = server.session();
    let handle = tokio::spawn(server.run());
    Ok(TestServer {
        addr,
        session,
        handle,
    })
}

/// Connects and waits for the `welcome`.
pub async fn join(addr: SocketAddr) -> anyhow::Result<(GameClient, PlayerId)> {
    let cfg = ClientConfig {
        server_addr: addr.to_string(),
        ..Default::default()
    };
    let client = GameClient::connect(&cfg).await?;
    let id = client.wait_for_welcome(Duration::from_secs(2)).await?;
    Ok((client, id))
}

/// Receives until `pred` matches, discarding everything before it.
pub async fn recv_until<F>(
    client: &mut GameClient,
    timeout: Duration,
    mut pred: F,
) -> anyhow::Result<Message>
where
    F: FnMut(&Message) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        let msg = client
            .recv_timeout(left)
            .await
            .context("no matching message before the deadline")?;
        if pred(&msg) {
            return Ok(msg);
        }
    }
}
