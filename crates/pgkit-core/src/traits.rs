//! Record traits for table-mapped types.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::value::Value;

/// A type mapped to a database table.
///
/// `COLUMNS` lists every column the table owns; `values` must return one
/// value per column, in the same order.
pub trait Record: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin {
    /// The database table name
    const TABLE: &'static str;

    /// Column names, in statement order
    const COLUMNS: &'static [&'static str];

    /// Current column values, aligned with `COLUMNS`
    fn values(&self) -> Vec<Value>;
}

/// A record with a single-column primary key.
pub trait Keyed: Record {
    const PRIMARY_KEY: &'static str = "id";

    fn primary_key(&self) -> Value;

    /// A null primary key marks a row that has not been inserted yet.
    fn is_persisted(&self) -> bool {
        !self.primary_key().is_null()
    }
}

/// A record carrying a deletion timestamp instead of being removed.
pub trait SoftDeletable {
    fn set_deleted(&mut self, at: DateTime<Utc>);
}
