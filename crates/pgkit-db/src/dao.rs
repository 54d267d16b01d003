//! Generic data-access object over [`Record`] types.
//!
//! Every operation renders a statement through [`crate::sql`] and runs it on
//! the owned [`Client`], so a transaction-bound DAO routes everything through
//! its transaction. Driver errors are translated at the client boundary.

use std::collections::HashMap;

use chrono::Utc;
use futures::future::BoxFuture;

use pgkit_core::{Error, Keyed, Record, Result, SoftDeletable, Value};
use pgkit_queries::{limit, QueryOptions};

use crate::client::Client;
use crate::sql;

/// Generic DAO with configurable timestamp column names.
#[derive(Clone)]
pub struct Dao {
    client: Client,
    updated_column: String,
    deleted_column: String,
}

impl Dao {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            updated_column: "updated".to_string(),
            deleted_column: "deleted".to_string(),
        }
    }

    /// Override the updated-timestamp column. Empty names are ignored.
    pub fn set_updated_column(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name.is_empty() {
            return;
        }
        self.updated_column = name;
    }

    /// Override the deleted-timestamp column. Empty names are ignored.
    pub fn set_deleted_column(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name.is_empty() {
            return;
        }
        self.deleted_column = name;
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }

    /// Select the single record matching the options; zero rows is `NotFound`.
    pub async fn find_one<T: Record>(&self, options: &QueryOptions) -> Result<T> {
        let mut options = options.clone();
        if options.pagination().is_none() {
            options.push(limit(1));
        }
        let (stmt, params) = sql::build_select(T::TABLE, T::COLUMNS, &options);
        self.client.fetch_one(&stmt, params).await
    }

    /// Select all records matching the options.
    pub async fn find_list<T: Record>(&self, options: &QueryOptions) -> Result<Vec<T>> {
        let (stmt, params) = sql::build_select(T::TABLE, T::COLUMNS, options);
        self.client.fetch_all(&stmt, params).await
    }

    /// Select matching records plus the total count ignoring pagination.
    pub async fn find_list_with_total<T: Record>(
        &self,
        options: &QueryOptions,
    ) -> Result<(Vec<T>, i64)> {
        let items = self.find_list(options).await?;
        let total = self.get_total::<T>(options).await?;
        Ok((items, total))
    }

    /// Count records matching the options, ignoring pagination.
    pub async fn get_total<T: Record>(&self, options: &QueryOptions) -> Result<i64> {
        let (stmt, params) = sql::build_count(T::TABLE, options);
        self.client.fetch_scalar(&stmt, params).await
    }

    /// Insert one record, refreshing it from `RETURNING *`. Null columns
    /// fall back to their defaults, so serial keys fill in.
    pub async fn insert<T: Keyed>(&self, rec: &mut T) -> Result<()> {
        let rows = vec![rec.values()];
        let (stmt, params) = sql::build_insert(T::TABLE, T::COLUMNS, &rows, true);
        *rec = self.client.fetch_one(&stmt, params).await?;
        Ok(())
    }

    /// Insert a batch in one statement, refreshing every record.
    pub async fn insert_many<T: Keyed>(&self, recs: &mut [T]) -> Result<()> {
        if recs.is_empty() {
            return Ok(());
        }
        let rows: Vec<Vec<Value>> = recs.iter().map(Record::values).collect();
        let (stmt, params) = sql::build_insert(T::TABLE, T::COLUMNS, &rows, true);
        let refreshed: Vec<T> = self.client.fetch_all(&stmt, params).await?;
        if refreshed.len() != recs.len() {
            return Err(Error::internal(format!(
                "insert returned {} rows for {} records",
                refreshed.len(),
                recs.len()
            )));
        }
        for (slot, row) in recs.iter_mut().zip(refreshed) {
            *slot = row;
        }
        Ok(())
    }

    /// Update the listed columns plus the updated-timestamp column, keyed on
    /// the primary key. A missing row is `NotFound`.
    pub async fn update<T: Keyed>(&self, rec: &T, columns: &[&str]) -> Result<()> {
        let sets = column_values(rec, columns)?;
        let (stmt, params) = sql::build_update(
            T::TABLE,
            &sets,
            &self.updated_column,
            T::PRIMARY_KEY,
            rec.primary_key(),
            false,
        );
        self.client.execute_one(&stmt, params).await?;
        Ok(())
    }

    /// As [`Dao::update`], but refreshes the record from `RETURNING *`.
    pub async fn update_returning<T: Keyed>(&self, rec: &mut T, columns: &[&str]) -> Result<()> {
        let sets = column_values(rec, columns)?;
        let (stmt, params) = sql::build_update(
            T::TABLE,
            &sets,
            &self.updated_column,
            T::PRIMARY_KEY,
            rec.primary_key(),
            true,
        );
        *rec = self.client.fetch_one(&stmt, params).await?;
        Ok(())
    }

    /// Update the given column/value pairs on every record matching the
    /// filter options. Returns the number of affected rows.
    pub async fn update_where<T: Record>(
        &self,
        options: &QueryOptions,
        sets: &[(&str, Value)],
    ) -> Result<u64> {
        let (stmt, params) =
            sql::build_update_where(T::TABLE, sets, &self.updated_column, &options.filters())
                .ok_or_else(|| Error::bad_request("update requires at least one condition"))?;
        self.client.execute(&stmt, params).await
    }

    /// Insert records, updating the listed columns on key conflicts.
    ///
    /// Records sharing the same composite key are de-duplicated first: the
    /// last occurrence wins, first-seen order is preserved.
    pub async fn upsert<T: Keyed>(&self, recs: &[T], keys: &[&str], columns: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Err(Error::bad_request("keys cannot be empty"));
        }
        if recs.is_empty() {
            return Err(Error::bad_request("records cannot be empty"));
        }
        if columns.is_empty() {
            return Err(Error::bad_request("columns cannot be empty"));
        }

        let key_indexes: Vec<usize> = keys
            .iter()
            .map(|key| column_index::<T>(key))
            .collect::<Result<_>>()?;

        let rows: Vec<Vec<Value>> = recs.iter().map(Record::values).collect();
        let rows = dedup_rows(rows, &key_indexes);

        let (stmt, params) = sql::build_upsert(T::TABLE, T::COLUMNS, &rows, keys, columns);
        self.client.execute(&stmt, params).await?;
        Ok(())
    }

    /// Stamp the record as deleted and persist the deleted column.
    pub async fn soft_delete<T: Keyed + SoftDeletable>(&self, rec: &mut T) -> Result<()> {
        rec.set_deleted(Utc::now());
        self.update(rec, &[self.deleted_column.as_str()]).await
    }

    /// Remove the record by primary key. A missing row is `NotFound`.
    pub async fn hard_delete<T: Keyed>(&self, rec: &T) -> Result<()> {
        let (stmt, params) = sql::build_delete(T::TABLE, T::PRIMARY_KEY, rec.primary_key());
        self.client.execute_one(&stmt, params).await?;
        Ok(())
    }

    /// Remove every record matching the filter options. Returns the number
    /// of affected rows.
    pub async fn hard_delete_where<T: Record>(&self, options: &QueryOptions) -> Result<u64> {
        let (stmt, params) = sql::build_delete_where(T::TABLE, &options.filters())
            .ok_or_else(|| Error::bad_request("delete requires at least one condition"))?;
        self.client.execute(&stmt, params).await
    }

    /// Run `f` against a transaction-bound DAO.
    ///
    /// Joins the active transaction when this DAO is already bound to one.
    /// Otherwise begins a transaction, commits on success, and rolls back on
    /// error; a rollback failure is logged and the original error kept.
    pub async fn with_tx<F, R>(&self, f: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a Dao) -> BoxFuture<'a, Result<R>>,
    {
        if self.client.in_transaction() {
            return f(self).await;
        }

        let tx_dao = Dao {
            client: self.client.begin().await?,
            updated_column: self.updated_column.clone(),
            deleted_column: self.deleted_column.clone(),
        };

        match f(&tx_dao).await {
            Ok(value) => {
                tx_dao.client.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx_dao.client.rollback().await {
                    tracing::warn!(error = %rollback_err, "failed to roll back transaction");
                }
                Err(err)
            }
        }
    }
}

fn column_index<T: Record>(column: &str) -> Result<usize> {
    T::COLUMNS
        .iter()
        .position(|c| *c == column)
        .ok_or_else(|| Error::bad_request(format!("unknown column: {}", column)))
}

fn column_values<'a, T: Record>(rec: &T, columns: &[&'a str]) -> Result<Vec<(&'a str, Value)>> {
    let values = rec.values();
    let mut sets = Vec::with_capacity(columns.len());
    for column in columns {
        let idx = column_index::<T>(column)?;
        let value = values
            .get(idx)
            .cloned()
            .ok_or_else(|| Error::internal(format!("no value for column: {}", column)))?;
        sets.push((*column, value));
    }
    Ok(sets)
}

/// De-duplicate rows by composite key: last occurrence wins, first-seen
/// order is preserved.
fn dedup_rows(rows: Vec<Vec<Value>>, key_indexes: &[usize]) -> Vec<Vec<Value>> {
    let mut unique: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = key_indexes
            .iter()
            .map(|&i| row.get(i).map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("_");
        match seen.get(&key) {
            Some(&pos) => unique[pos] = row,
            None => {
                seen.insert(key, unique.len());
                unique.push(row);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Account {
        id: Option<i64>,
        name: String,
        status: i64,
        updated: Option<DateTime<Utc>>,
        deleted: Option<DateTime<Utc>>,
    }

    impl Record for Account {
        const TABLE: &'static str = "accounts";
        const COLUMNS: &'static [&'static str] = &["id", "name", "status", "updated", "deleted"];

        fn values(&self) -> Vec<Value> {
            vec![
                self.id.into(),
                self.name.as_str().into(),
                self.status.into(),
                self.updated.into(),
                self.deleted.into(),
            ]
        }
    }

    impl Keyed for Account {
        fn primary_key(&self) -> Value {
            self.id.into()
        }
    }

    fn account(id: Option<i64>, name: &str, status: i64) -> Account {
        Account {
            id,
            name: name.to_string(),
            status,
            updated: None,
            deleted: None,
        }
    }

    #[test]
    fn test_column_values_picks_listed_columns() {
        let rec = account(Some(1), "ada", 2);
        let sets = column_values(&rec, &["name", "status"]).unwrap();
        assert_eq!(
            sets,
            vec![
                ("name", Value::Text("ada".to_string())),
                ("status", Value::Int(2)),
            ]
        );
    }

    #[test]
    fn test_column_values_rejects_unknown_column() {
        let rec = account(Some(1), "ada", 2);
        let err = column_values(&rec, &["missing"]).unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn test_dedup_last_occurrence_wins() {
        let rows = vec![
            vec![Value::Int(1), Value::Text("first".to_string())],
            vec![Value::Int(2), Value::Text("other".to_string())],
            vec![Value::Int(1), Value::Text("second".to_string())],
        ];
        let unique = dedup_rows(rows, &[0]);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0][1], Value::Text("second".to_string()));
        assert_eq!(unique[1][0], Value::Int(2));
    }

    #[test]
    fn test_dedup_composite_key() {
        let rows = vec![
            vec![Value::Int(1), Value::Int(10), Value::Text("a".to_string())],
            vec![Value::Int(1), Value::Int(20), Value::Text("b".to_string())],
        ];
        let unique = dedup_rows(rows, &[0, 1]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_unsaved_record_has_null_primary_key() {
        let rec = account(None, "ada", 1);
        assert!(!rec.is_persisted());
        assert!(account(Some(5), "ada", 1).is_persisted());
    }
}
