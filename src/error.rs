//! # Error Types for the Persistent Dictionary
//!
//! Structural operations on a dictionary (`add`, `remove`, `merge`, cursor
//! movement) are total: every version they read is immutable and well formed,
//! so there is nothing for them to report. The only recoverable failure is
//! asking for a key that is not there.
//!
//! ## Error Flow
//!
//! ```text
//! lookup(key)
//!      │
//!      ▼
//! Root present? ── no ──► Err(NotFound)
//!      │
//!      ▼ (yes)
//! Descend to leaf
//!      │
//!      ▼
//! Exact match? ── no ──► Err(NotFound)
//!      │
//!      ▼ (yes)
//! Ok(&value)
//! ```
//!
//! Callers for whom absence is an expected outcome should use
//! [`GenericDict::get`](crate::GenericDict::get) or
//! [`GenericDict::contains`](crate::GenericDict::contains) instead.

use thiserror::Error;

/// Errors returned by dictionary lookups.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// The dictionary is empty or does not contain the requested key.
	#[error("key not found")]
	NotFound,
}

/// A Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;
