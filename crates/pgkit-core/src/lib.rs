//! # pgkit-core
//!
//! Core types and traits for pgkit.
//!
//! This crate provides the foundational building blocks used across all other crates:
//! - Common error types
//! - Result type alias
//! - Record traits (Record, Keyed, SoftDeletable)
//! - Bind-parameter values
//! - Pagination types

pub mod error;
pub mod pagination;
pub mod result;
pub mod traits;
pub mod value;

pub use error::*;
pub use pagination::*;
pub use result::*;
pub use traits::*;
pub use value::*;
