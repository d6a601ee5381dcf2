//! `flotilla_client`
//!
//! Client-side systems:
//! - Connection management with a background receive task
//! - Coalescing order queue for outbound move commands
//! - Snapshot reconciliation with smoothed display positions
//! - A per-frame session tying the three together

pub mod client;
pub mod interp;
pub mod orders;
pub mod session;

pub use client::GameClient;
pub use session::{ClientPhase, ClientSession};
