//! Pure SQL rendering.
//!
//! Everything here is a pure function from the descriptive query model to a
//! statement string with `$n` placeholders plus the ordered parameter list,
//! so it is unit-testable without a database. Null values are rendered
//! inline (`IS NULL`, `DEFAULT`) and never reach the bind layer.

use pgkit_core::{Pagination, Value};
use pgkit_queries::{Filter, QueryOptions, SortDirection, SortOrder};

/// Push a parameter and return its `$n` placeholder.
fn push_param(params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    format!("${}", params.len())
}

/// Render filters into a WHERE fragment, appending bound values to `params`.
///
/// Returns `None` when no filter contributes a condition.
pub fn build_where(filters: &[&Filter], params: &mut Vec<Value>) -> Option<String> {
    let conditions: Vec<String> = filters
        .iter()
        .filter_map(|f| filter_to_sql(f, params))
        .collect();

    if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" AND "))
    }
}

fn filter_to_sql(filter: &Filter, params: &mut Vec<Value>) -> Option<String> {
    match filter {
        Filter::Eq { column, value } => Some(if value.is_null() {
            format!("{} IS NULL", column)
        } else {
            format!("{} = {}", column, push_param(params, value.clone()))
        }),
        Filter::NotEq { column, value } => Some(if value.is_null() {
            format!("{} IS NOT NULL", column)
        } else {
            format!("{} <> {}", column, push_param(params, value.clone()))
        }),
        Filter::In { column, values } => {
            if values.is_empty() {
                // an empty IN list must match nothing
                return Some("1 = 0".to_string());
            }
            Some(in_condition(column, values, params))
        }
        Filter::MayIn { column, values } => {
            if values.is_empty() {
                return None;
            }
            Some(in_condition(column, values, params))
        }
        Filter::Contains { column, needle } => {
            let pattern = format!("%{}%", escape_like(needle));
            Some(format!(
                "{} ILIKE {}",
                column,
                push_param(params, Value::Text(pattern))
            ))
        }
        Filter::IsNull { column } => Some(format!("{} IS NULL", column)),
        Filter::IsNotNull { column } => Some(format!("{} IS NOT NULL", column)),
        Filter::And(children) => group_to_sql(children, " AND ", params),
        Filter::Or(children) => group_to_sql(children, " OR ", params),
        Filter::JsonEq {
            column,
            path,
            value,
        } => {
            let path_param = push_param(params, Value::TextList(path.clone()));
            // #>> extracts text, so the comparison value is bound as text
            let text = match value {
                Value::Text(s) => s.clone(),
                other => other.to_string(),
            };
            let value_param = push_param(params, Value::Text(text));
            Some(format!("{} #>> {} = {}", column, path_param, value_param))
        }
        Filter::JsonContains { column, entries } => {
            if entries.is_empty() {
                return None;
            }
            let conditions: Vec<String> = entries
                .iter()
                .map(|entry| {
                    let doc = nest_json(&entry.path, entry.value.clone());
                    format!("{} @> {}", column, push_param(params, Value::Json(doc)))
                })
                .collect();
            if conditions.len() == 1 {
                Some(conditions.into_iter().next().unwrap_or_default())
            } else {
                Some(format!("({})", conditions.join(" AND ")))
            }
        }
        Filter::JsonContainsValue {
            column,
            needle,
            path,
        } => {
            let path_param = push_param(params, Value::TextList(path.clone()));
            let pattern = format!("%{}%", escape_like(needle));
            Some(format!(
                "{} #>> {} ILIKE {}",
                column,
                path_param,
                push_param(params, Value::Text(pattern))
            ))
        }
    }
}

fn in_condition(column: &str, values: &[Value], params: &mut Vec<Value>) -> String {
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| push_param(params, v.clone()))
        .collect();
    format!("{} IN ({})", column, placeholders.join(", "))
}

fn group_to_sql(children: &[Filter], joiner: &str, params: &mut Vec<Value>) -> Option<String> {
    let parts: Vec<String> = children
        .iter()
        .filter_map(|f| filter_to_sql(f, params))
        .collect();

    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(format!("({})", parts.join(joiner))),
    }
}

/// Wrap a value into nested single-key objects, outermost key first.
fn nest_json(path: &[String], value: serde_json::Value) -> serde_json::Value {
    path.iter().rev().fold(value, |acc, key| {
        let mut map = serde_json::Map::new();
        map.insert(key.clone(), acc);
        serde_json::Value::Object(map)
    })
}

/// Render an ORDER BY clause. Ascending sorts push nulls last, descending
/// sorts push nulls first.
pub fn build_order_by(sorts: &SortOrder) -> Option<String> {
    if sorts.is_empty() {
        return None;
    }

    let parts: Vec<String> = sorts
        .criteria()
        .iter()
        .map(|criterion| {
            let (direction, nulls) = match criterion.direction {
                SortDirection::Asc => ("ASC", "NULLS LAST"),
                SortDirection::Desc => ("DESC", "NULLS FIRST"),
            };
            format!("{} {} {}", criterion.column, direction, nulls)
        })
        .collect();

    Some(format!("ORDER BY {}", parts.join(", ")))
}

/// Render LIMIT/OFFSET with bound values.
pub fn build_limit_offset(pagination: &Pagination, params: &mut Vec<Value>) -> String {
    let limit = push_param(params, Value::Int(pagination.limit));
    let offset = push_param(params, Value::Int(pagination.offset));
    format!("LIMIT {} OFFSET {}", limit, offset)
}

/// Escape LIKE pattern metacharacters. Quoting is left to the bind layer.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// SELECT with WHERE, ORDER BY, and LIMIT/OFFSET per the options.
pub fn build_select(table: &str, columns: &[&str], options: &QueryOptions) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);

    if let Some(where_clause) = build_where(&options.filters(), &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }
    if let Some(order) = build_order_by(&options.sorts()) {
        sql.push(' ');
        sql.push_str(&order);
    }
    if let Some(pagination) = options.pagination() {
        let clause = build_limit_offset(&pagination, &mut params);
        sql.push(' ');
        sql.push_str(&clause);
    }

    (sql, params)
}

/// COUNT over the filtered set, ignoring sorts and pagination.
pub fn build_count(table: &str, options: &QueryOptions) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut sql = format!("SELECT COUNT(*) FROM {}", table);

    if let Some(where_clause) = build_where(&options.filters(), &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }

    (sql, params)
}

/// Multi-row INSERT. Null values render as `DEFAULT` so serial and default
/// columns fill themselves in.
pub fn build_insert(
    table: &str,
    columns: &[&str],
    rows: &[Vec<Value>],
    returning: bool,
) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut tuples = Vec::with_capacity(rows.len());

    for row in rows {
        let rendered: Vec<String> = row
            .iter()
            .map(|value| {
                if value.is_null() {
                    "DEFAULT".to_string()
                } else {
                    push_param(&mut params, value.clone())
                }
            })
            .collect();
        tuples.push(format!("({})", rendered.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        tuples.join(", ")
    );
    if returning {
        sql.push_str(" RETURNING *");
    }

    (sql, params)
}

/// UPDATE of the listed column/value pairs plus a server-side refresh of the
/// updated-timestamp column, keyed on the primary key.
pub fn build_update(
    table: &str,
    sets: &[(&str, Value)],
    updated_column: &str,
    pk_column: &str,
    pk: Value,
    returning: bool,
) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let assignments = render_assignments(sets, updated_column, &mut params);

    let pk_placeholder = push_param(&mut params, pk);
    let mut sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        assignments.join(", "),
        pk_column,
        pk_placeholder
    );
    if returning {
        sql.push_str(" RETURNING *");
    }

    (sql, params)
}

/// UPDATE constrained by filters instead of the primary key.
///
/// Returns `None` when the filters render no condition; an unconstrained
/// UPDATE is never emitted.
pub fn build_update_where(
    table: &str,
    sets: &[(&str, Value)],
    updated_column: &str,
    filters: &[&Filter],
) -> Option<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let assignments = render_assignments(sets, updated_column, &mut params);
    let where_clause = build_where(filters, &mut params)?;

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        where_clause
    );

    Some((sql, params))
}

fn render_assignments(
    sets: &[(&str, Value)],
    updated_column: &str,
    params: &mut Vec<Value>,
) -> Vec<String> {
    let mut assignments: Vec<String> = sets
        .iter()
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} = NULL", column)
            } else {
                format!("{} = {}", column, push_param(params, value.clone()))
            }
        })
        .collect();
    assignments.push(format!("{} = NOW()", updated_column));
    assignments
}

/// DELETE keyed on the primary key.
pub fn build_delete(table: &str, pk_column: &str, pk: Value) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let placeholder = push_param(&mut params, pk);
    let sql = format!("DELETE FROM {} WHERE {} = {}", table, pk_column, placeholder);
    (sql, params)
}

/// DELETE constrained by filters. Returns `None` when the filters render no
/// condition; an unconstrained DELETE is never emitted.
pub fn build_delete_where(table: &str, filters: &[&Filter]) -> Option<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let where_clause = build_where(filters, &mut params)?;
    let sql = format!("DELETE FROM {} WHERE {}", table, where_clause);
    Some((sql, params))
}

/// Multi-row INSERT with `ON CONFLICT (keys) DO UPDATE` over the listed
/// columns.
pub fn build_upsert(
    table: &str,
    columns: &[&str],
    rows: &[Vec<Value>],
    keys: &[&str],
    set_columns: &[&str],
) -> (String, Vec<Value>) {
    let (mut sql, params) = build_insert(table, columns, rows, false);

    let sets: Vec<String> = set_columns
        .iter()
        .map(|column| format!("{} = EXCLUDED.{}", column, column))
        .collect();
    sql.push_str(&format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        keys.join(", "),
        sets.join(", ")
    ));

    (sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgkit_queries::{self as opt, JsonPath};

    #[test]
    fn test_where_eq_and_contains() {
        let f1 = Filter::eq("status", 1);
        let f2 = Filter::contains("name", "ada");
        let mut params = Vec::new();

        let clause = build_where(&[&f1, &f2], &mut params).unwrap();
        assert_eq!(clause, "status = $1 AND name ILIKE $2");
        assert_eq!(
            params,
            vec![Value::Int(1), Value::Text("%ada%".to_string())]
        );
    }

    #[test]
    fn test_eq_null_renders_is_null() {
        let f = Filter::eq("deleted", Value::Null);
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "deleted IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_in_empty_matches_nothing() {
        let f = Filter::in_list("id", Vec::<i64>::new());
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "1 = 0");
    }

    #[test]
    fn test_may_in_empty_is_skipped() {
        let may = Filter::may_in("id", Vec::<i64>::new());
        let eq = Filter::eq("status", 1);
        let mut params = Vec::new();
        let clause = build_where(&[&may, &eq], &mut params).unwrap();
        assert_eq!(clause, "status = $1");
    }

    #[test]
    fn test_in_renders_one_placeholder_per_value() {
        let f = Filter::in_list("id", vec![1i64, 2, 3]);
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "id IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_nested_or_group() {
        let f = Filter::or(vec![
            Filter::eq("id", 1),
            Filter::and(vec![Filter::eq("id", 2), Filter::is_not_null("deleted")]),
        ]);
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "(id = $1 OR (id = $2 AND deleted IS NOT NULL))");
    }

    #[test]
    fn test_single_child_group_is_not_wrapped() {
        let f = Filter::or(vec![Filter::eq("id", 1)]);
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "id = $1");
    }

    #[test]
    fn test_json_eq() {
        let f = Filter::json_eq("meta", "valueD", vec!["a", "d"]);
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "meta #>> $1 = $2");
        assert_eq!(
            params,
            vec![
                Value::TextList(vec!["a".to_string(), "d".to_string()]),
                Value::Text("valueD".to_string()),
            ]
        );
    }

    #[test]
    fn test_json_eq_coerces_value_to_text() {
        let f = Filter::json_eq("meta", 7, vec!["a"]);
        let mut params = Vec::new();
        build_where(&[&f], &mut params).unwrap();
        assert_eq!(params[1], Value::Text("7".to_string()));
    }

    #[test]
    fn test_json_contains_builds_nested_document() {
        let f = Filter::json_contains(
            "meta",
            vec![JsonPath::new(vec!["a", "b"], serde_json::json!("valueB"))],
        );
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "meta @> $1");
        assert_eq!(
            params,
            vec![Value::Json(serde_json::json!({"a": {"b": "valueB"}}))]
        );
    }

    #[test]
    fn test_json_contains_multiple_entries() {
        let f = Filter::json_contains(
            "meta",
            vec![
                JsonPath::new(vec!["a"], serde_json::json!(1)),
                JsonPath::new(vec!["b"], serde_json::json!(2)),
            ],
        );
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "(meta @> $1 AND meta @> $2)");
    }

    #[test]
    fn test_json_contains_value() {
        let f = Filter::json_contains_value("meta", "val", vec!["a", "d"]);
        let mut params = Vec::new();
        let clause = build_where(&[&f], &mut params).unwrap();
        assert_eq!(clause, "meta #>> $1 ILIKE $2");
        assert_eq!(params[1], Value::Text("%val%".to_string()));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("test"), "test");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_build_order_by() {
        assert!(build_order_by(&SortOrder::new()).is_none());

        let single = SortOrder::by_desc("updated");
        assert_eq!(
            build_order_by(&single).unwrap(),
            "ORDER BY updated DESC NULLS FIRST"
        );

        let multiple = SortOrder::by_asc("position").then_desc("id");
        assert_eq!(
            build_order_by(&multiple).unwrap(),
            "ORDER BY position ASC NULLS LAST, id DESC NULLS FIRST"
        );
    }

    #[test]
    fn test_build_select_full() {
        let options = QueryOptions::from(vec![
            opt::eq("status", 1),
            opt::desc("updated"),
            opt::page(2, 10),
        ]);
        let (sql, params) = build_select("accounts", &["id", "name", "status"], &options);
        assert_eq!(
            sql,
            "SELECT id, name, status FROM accounts WHERE status = $1 \
             ORDER BY updated DESC NULLS FIRST LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            params,
            vec![Value::Int(1), Value::Int(10), Value::Int(10)]
        );
    }

    #[test]
    fn test_build_select_without_options() {
        let (sql, params) = build_select("accounts", &["id"], &QueryOptions::new());
        assert_eq!(sql, "SELECT id FROM accounts");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_count_ignores_pagination() {
        let options = QueryOptions::from(vec![opt::eq("status", 1), opt::page(5, 10)]);
        let (sql, params) = build_count("accounts", &options);
        assert_eq!(sql, "SELECT COUNT(*) FROM accounts WHERE status = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_build_insert_renders_default_for_null() {
        let rows = vec![vec![Value::Null, Value::Text("ada".to_string())]];
        let (sql, params) = build_insert("accounts", &["id", "name"], &rows, true);
        assert_eq!(
            sql,
            "INSERT INTO accounts (id, name) VALUES (DEFAULT, $1) RETURNING *"
        );
        assert_eq!(params, vec![Value::Text("ada".to_string())]);
    }

    #[test]
    fn test_build_insert_many() {
        let rows = vec![
            vec![Value::Int(1), Value::Text("a".to_string())],
            vec![Value::Int(2), Value::Text("b".to_string())],
        ];
        let (sql, params) = build_insert("accounts", &["id", "name"], &rows, false);
        assert_eq!(
            sql,
            "INSERT INTO accounts (id, name) VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_build_update() {
        let sets = [("name", Value::Text("ada".to_string()))];
        let (sql, params) = build_update("accounts", &sets, "updated", "id", Value::Int(3), false);
        assert_eq!(
            sql,
            "UPDATE accounts SET name = $1, updated = NOW() WHERE id = $2"
        );
        assert_eq!(
            params,
            vec![Value::Text("ada".to_string()), Value::Int(3)]
        );
    }

    #[test]
    fn test_build_update_returning() {
        let sets = [("name", Value::Text("ada".to_string()))];
        let (sql, _) = build_update("accounts", &sets, "updated", "id", Value::Int(3), true);
        assert!(sql.ends_with("RETURNING *"));
    }

    #[test]
    fn test_build_update_where_requires_conditions() {
        let sets = [("status", Value::Int(2))];
        assert!(build_update_where("accounts", &sets, "updated", &[]).is_none());

        let filter = Filter::eq("status", 1);
        let (sql, params) =
            build_update_where("accounts", &sets, "updated", &[&filter]).unwrap();
        assert_eq!(
            sql,
            "UPDATE accounts SET status = $1, updated = NOW() WHERE status = $2"
        );
        assert_eq!(params, vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_build_delete() {
        let (sql, params) = build_delete("accounts", "id", Value::Int(9));
        assert_eq!(sql, "DELETE FROM accounts WHERE id = $1");
        assert_eq!(params, vec![Value::Int(9)]);
    }

    #[test]
    fn test_build_delete_where_requires_conditions() {
        assert!(build_delete_where("accounts", &[]).is_none());

        let may = Filter::may_in("id", Vec::<i64>::new());
        assert!(build_delete_where("accounts", &[&may]).is_none());

        let filter = Filter::eq("status", 0);
        let (sql, _) = build_delete_where("accounts", &[&filter]).unwrap();
        assert_eq!(sql, "DELETE FROM accounts WHERE status = $1");
    }

    #[test]
    fn test_build_upsert() {
        let rows = vec![vec![Value::Int(1), Value::Text("a".to_string())]];
        let (sql, params) =
            build_upsert("accounts", &["id", "name"], &rows, &["id"], &["name"]);
        assert_eq!(
            sql,
            "INSERT INTO accounts (id, name) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"
        );
        assert_eq!(params.len(), 2);
    }
}
