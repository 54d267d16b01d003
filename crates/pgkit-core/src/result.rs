//! Result type alias.

use crate::error::Error;

/// Result alias used across all pgkit crates.
pub type Result<T> = std::result::Result<T, Error>;
