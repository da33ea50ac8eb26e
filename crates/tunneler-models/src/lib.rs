//! Core data models for Tunneler.
//!
//! This crate provides the value types shared by every Tunneler crate:
//! the immutable [`TunnelSpec`] describing one connection attempt, the
//! [`ConnectionState`] reported to observers, and the persisted
//! [`TunnelProfile`] a front-end turns into specs.

pub mod profile;
pub mod state;
pub mod tunnel;

pub use profile::{TunnelProfile, PROFILE_KEYS};
pub use state::ConnectionState;
pub use tunnel::{TunnelSpec, DEFAULT_SOCKS_PORT, DEFAULT_SSH_PORT};
