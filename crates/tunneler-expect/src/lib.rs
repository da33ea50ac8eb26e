//! Expect-style output matching for Tunneler.
//!
//! An [`Expecter`] pulls output from a [`SubprocessChannel`] into a bounded
//! [`ExpectBuffer`] and scans it against an ordered [`PatternTable`]. The
//! leftmost match wins; when two entries match at the same offset the one
//! listed first wins. Only the input up to the end of the match is consumed.
//!
//! The tunnel wrapper's output vocabulary lives in [`signal`]: the
//! [`Signal`] type and the primary and secondary tables.
//!
//! # Example
//!
//! ```
//! use tunneler_expect::{Matcher, PatternTable};
//!
//! let table = PatternTable::new()
//!     .literal("ok", "connection ok")
//!     .literal("down", "ssh: connect to host");
//!
//! let found = table.find(b"ssh: connect to host x; connection ok").unwrap();
//! assert_eq!(found.kind, "down");
//! assert!(matches!(Matcher::literal("a"), Matcher::Literal(_)));
//! ```
//!
//! [`SubprocessChannel`]: tunneler_process::SubprocessChannel

pub mod buffer;
pub mod error;
pub mod expecter;
pub mod pattern;
pub mod signal;

pub use buffer::{ExpectBuffer, DEFAULT_CAPACITY};
pub use error::{ExpectError, Result};
pub use expecter::{Expectation, Expecter, Match};
pub use pattern::{Found, Matcher, PatternTable};
pub use signal::{primary_table, secondary_table, AuthFailure, Phase, Signal};
