//! `level_relay`
//!
//! Room relay for two-peer sessions:
//! - Assigns peer ordinals and nicknames
//! - Tracks the authority peer and hands it over when it leaves
//! - Routes remote calls to `All` / `Others` / `Authority` / `RoomObject`
//! - Forwards player snapshots to the non-owning peer
//! - Replays cached creation calls to late joiners

pub mod relay;

pub use relay::RelayServer;
