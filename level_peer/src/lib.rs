//! `level_peer`
//!
//! Peer-side systems:
//! - Relay connection behind the [`client::RelayLink`] seam
//! - Fixed-tick level driver
//! - Display smoothing for remote avatars

pub mod client;
pub mod driver;
pub mod smoothing;

pub use client::PeerClient;
pub use driver::PeerDriver;
