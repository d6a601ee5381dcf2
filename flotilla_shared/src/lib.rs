//! `flotilla_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One explicit, tagged message schema for every wire record.
//! - Units are plain records tagged with a kind; constants live in a catalog.
//! - The world is a collaborator behind a trait so tests can use fixed maps.
//! - No `unsafe`.

pub mod catalog;
pub mod config;
pub mod math;
pub mod net;
pub mod state;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::catalog::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::state::*;
    pub use crate::world::*;
}
