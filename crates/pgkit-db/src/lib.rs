//! # pgkit-db
//!
//! Database layer for pgkit.
//!
//! This crate provides PostgreSQL access using SQLx, including:
//!
//! - Connection pool configuration and construction
//! - A [`Client`] facade routing statements through the pool or an active
//!   transaction
//! - Pure SQL rendering for the filter/sort/pagination model
//! - A generic [`Dao`] over table-mapped record types
//!
//! ## Example
//!
//! ```ignore
//! use pgkit_db::{Client, Dao, DatabaseConfig};
//! use pgkit_queries::{QueryOptions, eq, desc};
//!
//! let config = DatabaseConfig::from_env();
//! let client = Client::connect(&config).await?;
//! let dao = Dao::new(client);
//!
//! let opts = QueryOptions::from(vec![eq("status", 1), desc("updated")]);
//! let rows: Vec<Account> = dao.find_list(&opts).await?;
//! ```

pub mod client;
pub mod dao;
pub mod pool;
pub mod sql;

pub use client::Client;
pub use dao::Dao;
pub use pool::{DatabaseConfig, PoolStats};
