//! `flotilla_server`
//!
//! Server-side systems:
//! - Connection registry with monotonically assigned player ids
//! - Lobby roster broadcasts and the host-only match start
//! - Per-player command buffer, drained once per tick
//! - Authoritative fixed-period simulation
//!
//! Networking model:
//! - One TCP stream per client carrying length-prefixed JSON frames
//! - Full game state broadcast after every tick
//! - Per-connection bounded outbound queue; a peer that stops reading is
//!   dropped instead of stalling the others

pub mod commands;
pub mod lobby;
pub mod outbound;
pub mod registry;
pub mod server;
pub mod session;
pub mod sim;

pub use server::{bind_ephemeral, GameServer};
