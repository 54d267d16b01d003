//! Query filters.
//!
//! Filters are the building blocks of query conditions. Each filter
//! describes a predicate on a column; the database layer renders the tree
//! into SQL with bound parameters.

use pgkit_core::Value;

/// One path/value pair inside a JSON containment predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    /// Key path into the JSON document, outermost key first
    pub path: Vec<String>,
    /// Expected value at that path
    pub value: serde_json::Value,
}

impl JsonPath {
    pub fn new(path: Vec<impl Into<String>>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }
}

/// A single filter condition, possibly nested.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value (`IS NULL` when the value is null)
    Eq { column: String, value: Value },
    /// Column differs from value (`IS NOT NULL` when the value is null)
    NotEq { column: String, value: Value },
    /// Column is one of the listed values; an empty list matches nothing
    In { column: String, values: Vec<Value> },
    /// Column is one of the listed values; an empty list is skipped entirely
    MayIn { column: String, values: Vec<Value> },
    /// Column contains the substring, case-insensitive
    Contains { column: String, needle: String },
    IsNull { column: String },
    IsNotNull { column: String },
    /// All child conditions hold
    And(Vec<Filter>),
    /// Any child condition holds
    Or(Vec<Filter>),
    /// Value at a JSON path equals the given value
    JsonEq {
        column: String,
        path: Vec<String>,
        value: Value,
    },
    /// JSON document contains every listed path/value pair
    JsonContains { column: String, entries: Vec<JsonPath> },
    /// Text at a JSON path contains the substring, case-insensitive
    JsonContainsValue {
        column: String,
        needle: String,
        path: Vec<String>,
    },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::NotEq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<impl Into<Value>>) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Like [`Filter::in_list`], but an empty list contributes no condition.
    pub fn may_in(column: impl Into<String>, values: Vec<impl Into<Value>>) -> Self {
        Filter::MayIn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains {
            column: column.into(),
            needle: needle.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull {
            column: column.into(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::IsNotNull {
            column: column.into(),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn json_eq(
        column: impl Into<String>,
        value: impl Into<Value>,
        path: Vec<impl Into<String>>,
    ) -> Self {
        Filter::JsonEq {
            column: column.into(),
            path: path.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }

    pub fn json_contains(column: impl Into<String>, entries: Vec<JsonPath>) -> Self {
        Filter::JsonContains {
            column: column.into(),
            entries,
        }
    }

    pub fn json_contains_value(
        column: impl Into<String>,
        needle: impl Into<String>,
        path: Vec<impl Into<String>>,
    ) -> Self {
        Filter::JsonContainsValue {
            column: column.into(),
            needle: needle.into(),
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Check that the filter references a column and carries what its
    /// operator needs. Nested groups are valid when every child is.
    pub fn is_valid(&self) -> bool {
        match self {
            Filter::Eq { column, .. }
            | Filter::NotEq { column, .. }
            | Filter::In { column, .. }
            | Filter::MayIn { column, .. }
            | Filter::IsNull { column }
            | Filter::IsNotNull { column } => !column.is_empty(),
            Filter::Contains { column, needle } => !column.is_empty() && !needle.is_empty(),
            Filter::And(children) | Filter::Or(children) => {
                !children.is_empty() && children.iter().all(Filter::is_valid)
            }
            Filter::JsonEq { column, path, .. } => !column.is_empty() && !path.is_empty(),
            Filter::JsonContains { column, entries } => {
                !column.is_empty()
                    && !entries.is_empty()
                    && entries.iter().all(|e| !e.path.is_empty())
            }
            Filter::JsonContainsValue {
                column,
                needle,
                path,
            } => !column.is_empty() && !needle.is_empty() && !path.is_empty(),
        }
    }

    /// True when rendering would produce no condition at all.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Filter::MayIn { values, .. } if values.is_empty())
    }
}
