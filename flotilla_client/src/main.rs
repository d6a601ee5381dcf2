//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p flotilla_client -- [--addr 127.0.0.1:5555] [--auto-start 2]
//!
//! Connects, follows the lobby and logs every match turn. With
//! `--auto-start <n>` the host requests the match start as soon as the
//! roster holds `n` players.

use std::{env, time::Duration};

use anyhow::Context;
use flotilla_client::{ClientPhase, ClientSession};
use flotilla_shared::config::ClientConfig;
use tracing::info;

/// Local frame period.
const FRAME: Duration = Duration::from_millis(16);

struct Args {
    cfg: ClientConfig,
    auto_start: Option<usize>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut cfg = ClientConfig::default();
    let mut auto_start = None;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--auto-start" if i + 1 < args.len() => {
                auto_start = Some(args[i + 1].parse().context("--auto-start")?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, auto_start })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let mut session = ClientSession::connect(&args.cfg, Duration::from_secs(5))
        .await
        .context("join server")?;
    info!(player_id = ?session.player_id(), "Joined lobby");

    let mut frames = tokio::time::interval(FRAME);
    let mut start_requested = false;
    let mut last_turn = None;
    let mut roster_len = 0;

    loop {
        tokio::select! {
            _ = frames.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                session.disconnect().await?;
                return Ok(());
            }
        }

        session.frame();
        match session.phase() {
            ClientPhase::Lobby => {
                let roster = session.roster();
                if roster.len() != roster_len {
                    roster_len = roster.len();
                    info!(players = roster_len, host = session.is_host(), "Lobby changed");
                }
                let ready = args.auto_start.is_some_and(|n| roster_len >= n);
                if ready && session.is_host() && !start_requested {
                    info!("Requesting match start");
                    session.request_start().await?;
                    start_requested = true;
                }
            }
            ClientPhase::InMatch => {
                let turn = session.view().turn();
                if turn != last_turn {
                    last_turn = turn;
                    let me = session.player_id();
                    let own = me.map_or(0, |id| session.view().units_of(id).count());
                    let seen = me.map_or(0, |id| session.view().visible_to(id).len());
                    info!(turn = ?turn, own_units = own, visible_enemies = seen, "Turn");
                }
                session.submit_orders().await?;
            }
            ClientPhase::Disconnected => {
                info!("Server connection lost, exiting");
                return Ok(());
            }
        }
    }
}
