//! mimic core: rule-matching primitives, patch-level encoding, and error types.
//!
//! This crate defines the decision primitives shared by the policy engine and
//! any embedding layer. It intentionally carries no runtime or I/O
//! dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MimicError`/`Result`, or fall back to
//! a logged default, so the host process does not crash on malformed input.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod patch;
pub mod trie;

/// Shared result type.
pub use error::{MimicError, Result};

/// Opaque numeric handle identifying a calling process.
///
/// Supplied by the interception boundary; the engine only uses it as a cache
/// and decision key and never interprets its value.
pub type CallerId = u32;
