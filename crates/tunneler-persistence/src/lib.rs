//! Persistence layer for Tunneler.
//!
//! State lives in a single directory (by default `~/.tunneler`). Files are
//! written through a temporary file and renamed into place, so a crash never
//! leaves a half-written profile behind.

pub mod atomic;
pub mod error;
pub mod profile_store;

pub use atomic::{atomic_write, atomic_write_json, read_json_optional};
pub use error::{PersistenceError, Result};
pub use profile_store::{ProfileStore, PROFILE_FILE};
