//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p flotilla_server -- [--config server.json] [--host 0.0.0.0]
//!       [--port 5555] [--max-players 4] [--tick-ms 1000]
//!
//! Flags given on the command line override the config file.

use std::{env, sync::Arc};

use anyhow::Context;
use flotilla_server::GameServer;
use flotilla_shared::prelude::{GeneratedWorlds, ServerConfig};
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ServerConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" if i + 1 < args.len() => {
                cfg.host = args[i + 1].clone();
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1].parse().context("--port")?;
                i += 2;
            }
            "--max-players" if i + 1 < args.len() => {
                cfg.max_players = args[i + 1].parse().context("--max-players")?;
                i += 2;
            }
            "--tick-ms" if i + 1 < args.len() => {
                cfg.tick_period_ms = args[i + 1].parse().context("--tick-ms")?;
                i += 2;
            }
            "--config" => i += 2,
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        host = %cfg.host,
        port = cfg.port,
        max_players = cfg.max_players,
        tick_period_ms = cfg.tick_period_ms,
        "Starting server"
    );

    let server = GameServer::bind(cfg, Arc::new(GeneratedWorlds))
        .await
        .context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    tokio::select! {
        res = server.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
