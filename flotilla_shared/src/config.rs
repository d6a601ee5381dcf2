//! Configuration system.
//!
//! Loads server and client configuration from JSON strings (file IO left to
//! the binaries). Every field has a default so partial documents are valid.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_PORT;

/// Server process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind; all interfaces by default.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Capacity of the lobby; further connections are refused.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Wall-clock period of one simulation tick.
    #[serde(default = "default_period_ms")]
    pub tick_period_ms: u64,
    /// Period of the lobby roster broadcast.
    #[serde(default = "default_period_ms")]
    pub lobby_period_ms: u64,
    /// Frames that may wait for one slow peer before it is dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Longest a single frame write may take before the peer is dropped.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_players() -> usize {
    4
}

fn default_period_ms() -> u64 {
    1000
}

fn default_outbound_queue() -> usize {
    64
}

fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_players: default_max_players(),
            tick_period_ms: default_period_ms(),
            lobby_period_ms: default_period_ms(),
            outbound_queue: default_outbound_queue(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("parse bind address {}:{}", self.host, self.port))
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn lobby_period(&self) -> Duration {
        Duration::from_millis(self.lobby_period_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Client process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:5555`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Capacity of the inbound message queue between the receive task and
    /// the frame loop.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
    /// Fraction of the remaining distance the displayed position covers
    /// each frame.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

fn default_server_addr() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

fn default_inbound_capacity() -> usize {
    256
}

fn default_smoothing() -> f32 {
    0.2
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            inbound_capacity: default_inbound_capacity(),
            smoothing: default_smoothing(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
