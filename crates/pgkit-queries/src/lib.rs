//! # pgkit-queries
//!
//! Descriptive filter, sort, and query-option model for pgkit.
//!
//! Filters built here are purely descriptive; SQL rendering happens in the
//! database layer. Options compose into a [`QueryOptions`] list that the DAO
//! applies to its statements.
//!
//! ## Example
//!
//! ```ignore
//! use pgkit_queries::{QueryOptions, eq, may_in, desc, page};
//!
//! let opts = QueryOptions::from(vec![
//!     eq("status", 1),
//!     may_in("project_id", vec![]),
//!     desc("updated"),
//!     page(2, 25),
//! ]);
//! ```

pub mod filters;
pub mod options;
pub mod sorts;

pub use filters::{Filter, JsonPath};
pub use options::*;
pub use sorts::{SortCriterion, SortDirection, SortOrder};

pub use pgkit_core::Value;
