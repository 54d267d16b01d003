//! # pgkit-migrate
//!
//! Schema migration runner for pgkit.
//!
//! Applies SQL migrations from a directory against a PostgreSQL database,
//! optionally dropping and recreating schemas first. Applied versions are
//! tracked in the `_sqlx_migrations` table.
//!
//! ## Example
//!
//! ```ignore
//! use pgkit_migrate::Migrator;
//!
//! let migrator = Migrator::new("./migrations", &dsn).clean(["public"]);
//! migrator.run().await?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use pgkit_core::Result;

/// Runs pending migrations from a directory against a database.
///
/// The runner opens its own single connection, applies migrations in
/// version order, and closes the connection when done. A database that is
/// already up to date is success, not an error.
#[derive(Debug, Clone)]
pub struct Migrator {
    path: PathBuf,
    dsn: String,
    clean_schemas: Vec<String>,
}

impl Migrator {
    /// Create a migrator for a migrations directory and connection string.
    pub fn new(path: impl Into<PathBuf>, dsn: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dsn: dsn.into(),
            clean_schemas: Vec::new(),
        }
    }

    /// Drop and recreate the given schemas before migrating.
    pub fn clean<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clean_schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Apply all pending migrations.
    ///
    /// Logs the schema version before and after, and warns when a previous
    /// run left a failed migration behind.
    pub async fn run(&self) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&self.dsn)
            .await?;

        let result = self.run_on(&pool).await;
        pool.close().await;
        result
    }

    async fn run_on(&self, pool: &PgPool) -> Result<()> {
        for schema in &self.clean_schemas {
            clean_schema(pool, schema).await?;
        }

        let migrator = sqlx::migrate::Migrator::new(self.path.as_path()).await?;

        let before = current_version(pool).await?;
        match before {
            Some((version, dirty)) => {
                tracing::info!(version, "migration started");
                if dirty {
                    tracing::warn!(version, "previous migration failed");
                }
            }
            None => tracing::info!("migration started on empty database"),
        }

        migrator.run(pool).await?;

        match (before, current_version(pool).await?) {
            (Some((before_version, _)), Some((version, _))) if version == before_version => {
                tracing::info!(version, "no new database changes");
            }
            (_, Some((version, _))) => tracing::info!(version, "migration done"),
            (_, None) => tracing::info!("migration done, nothing to apply"),
        }

        Ok(())
    }
}

/// Latest applied version and whether it failed, once the tracking table
/// exists.
async fn current_version(pool: &PgPool) -> Result<Option<(i64, bool)>> {
    let exists: bool = sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await?;
    if !exists {
        return Ok(None);
    }
    let row: Option<(i64, bool)> = sqlx::query_as(
        "SELECT version, NOT success FROM _sqlx_migrations ORDER BY version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn clean_schema(pool: &PgPool, schema: &str) -> Result<()> {
    tracing::info!(schema, "cleaning schema");
    let ident = quote_ident(schema);
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", ident))
        .execute(pool)
        .await?;
    sqlx::query(&format!("CREATE SCHEMA {}", ident))
        .execute(pool)
        .await?;
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let migrator = Migrator::new("./migrations", "postgres://localhost/pgkit");
        assert!(migrator.clean_schemas.is_empty());
        assert_eq!(migrator.path, PathBuf::from("./migrations"));
    }

    #[test]
    fn test_clean_schemas() {
        let migrator =
            Migrator::new("./migrations", "postgres://localhost/pgkit").clean(["public", "audit"]);
        assert_eq!(migrator.clean_schemas, vec!["public", "audit"]);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("public"), "\"public\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
