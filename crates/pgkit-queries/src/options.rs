//! Query options.
//!
//! A [`QueryOpt`] is one instruction to a query: a filter condition, a sort
//! criterion, or pagination. Free constructors in this module keep call
//! sites short; [`QueryOptions`] collects them for the DAO to apply.

use pgkit_core::{Pagination, Value};

use crate::filters::{Filter, JsonPath};
use crate::sorts::{SortCriterion, SortOrder};

/// One query instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOpt {
    Where(Filter),
    Sort(SortCriterion),
    Page(Pagination),
}

/// An ordered list of query instructions.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    opts: Vec<QueryOpt>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self { opts: vec![] }
    }

    pub fn push(&mut self, opt: QueryOpt) -> &mut Self {
        self.opts.push(opt);
        self
    }

    /// Add an option (builder pattern)
    pub fn with(mut self, opt: QueryOpt) -> Self {
        self.opts.push(opt);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.opts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.opts.len()
    }

    /// All filter conditions, in insertion order.
    pub fn filters(&self) -> Vec<&Filter> {
        self.opts
            .iter()
            .filter_map(|opt| match opt {
                QueryOpt::Where(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    /// All sort criteria, in insertion order.
    pub fn sorts(&self) -> SortOrder {
        self.opts
            .iter()
            .filter_map(|opt| match opt {
                QueryOpt::Sort(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    /// Pagination, when set. The last page option wins.
    pub fn pagination(&self) -> Option<Pagination> {
        self.opts
            .iter()
            .rev()
            .find_map(|opt| match opt {
                QueryOpt::Page(p) => Some(*p),
                _ => None,
            })
    }
}

impl From<Vec<QueryOpt>> for QueryOptions {
    fn from(opts: Vec<QueryOpt>) -> Self {
        Self { opts }
    }
}

impl FromIterator<QueryOpt> for QueryOptions {
    fn from_iter<I: IntoIterator<Item = QueryOpt>>(iter: I) -> Self {
        Self {
            opts: iter.into_iter().collect(),
        }
    }
}

pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> QueryOpt {
    QueryOpt::Where(Filter::eq(column, value))
}

pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> QueryOpt {
    QueryOpt::Where(Filter::not_eq(column, value))
}

pub fn in_list(column: impl Into<String>, values: Vec<impl Into<Value>>) -> QueryOpt {
    QueryOpt::Where(Filter::in_list(column, values))
}

/// Membership condition that is skipped when the list is empty.
pub fn may_in(column: impl Into<String>, values: Vec<impl Into<Value>>) -> QueryOpt {
    QueryOpt::Where(Filter::may_in(column, values))
}

pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> QueryOpt {
    QueryOpt::Where(Filter::contains(column, needle))
}

pub fn is_null(column: impl Into<String>) -> QueryOpt {
    QueryOpt::Where(Filter::is_null(column))
}

pub fn is_not_null(column: impl Into<String>) -> QueryOpt {
    QueryOpt::Where(Filter::is_not_null(column))
}

pub fn and(filters: Vec<Filter>) -> QueryOpt {
    QueryOpt::Where(Filter::and(filters))
}

pub fn or(filters: Vec<Filter>) -> QueryOpt {
    QueryOpt::Where(Filter::or(filters))
}

pub fn json_eq(
    column: impl Into<String>,
    value: impl Into<Value>,
    path: Vec<impl Into<String>>,
) -> QueryOpt {
    QueryOpt::Where(Filter::json_eq(column, value, path))
}

pub fn json_contains(column: impl Into<String>, entries: Vec<JsonPath>) -> QueryOpt {
    QueryOpt::Where(Filter::json_contains(column, entries))
}

pub fn json_contains_value(
    column: impl Into<String>,
    needle: impl Into<String>,
    path: Vec<impl Into<String>>,
) -> QueryOpt {
    QueryOpt::Where(Filter::json_contains_value(column, needle, path))
}

pub fn asc(column: impl Into<String>) -> QueryOpt {
    QueryOpt::Sort(SortCriterion::asc(column))
}

pub fn desc(column: impl Into<String>) -> QueryOpt {
    QueryOpt::Sort(SortCriterion::desc(column))
}

/// Paginate with a 1-based page number.
pub fn page(page: i64, per_page: i64) -> QueryOpt {
    QueryOpt::Page(Pagination::page(page, per_page))
}

pub fn limit(limit: i64) -> QueryOpt {
    QueryOpt::Page(Pagination::new(limit, 0))
}
