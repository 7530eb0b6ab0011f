//! `level_shared`
//!
//! Core of a two-peer networked platformer level, used by both the relay
//! and the peers.
//!
//! Design goals:
//! - Deterministic given an RNG seed; the only clock is the one passed to `tick`.
//! - Explicit construction of every collaborator, no global managers.
//! - A closed set of remote calls dispatched through one handler table.
//! - No `unsafe`.

pub mod authority;
pub mod config;
pub mod entity;
pub mod event;
pub mod ledger;
pub mod level;
pub mod math;
pub mod net;
pub mod objects;
pub mod persistence;
pub mod pool;
pub mod replication;
pub mod room;
pub mod session;
pub mod spawn;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::event::*;
    pub use crate::level::{Collider, Level};
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::session::{Panel, SessionState};
}
