use crate::core::{RepoError, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A single predicate in the filter vocabulary shared by reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column IN (values)`; an empty list matches nothing.
    In { column: String, values: Vec<Value> },
    /// Case-insensitive LIKE with `%` / `_` wildcards.
    ILike { column: String, pattern: String },
    /// Case-insensitive LIKE against any of several columns.
    AnyILike { columns: Vec<String>, pattern: String },
    /// `column IS NULL` (an absent column counts as NULL).
    IsNull { column: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::ILike {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull {
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        matches!(self, Self::Asc)
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(RepoError::Validation(format!(
                "unknown sort direction '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// Inclusive row window `[from, to]`. A window with `to < from` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub from: usize,
    pub to: usize,
}

impl Range {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// Window of `count` rows starting at `from`. A zero count is read as one.
    pub fn starting_at(from: usize, count: usize) -> Self {
        Self::new(from, from.saturating_add(count.max(1) - 1))
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    /// Window for a 1-based `page` of `limit` rows: `[(page-1)*limit, page*limit-1]`.
    ///
    /// Returns `None` when either value is zero.
    pub fn page(page: usize, limit: usize) -> Option<Self> {
        if page == 0 || limit == 0 {
            return None;
        }
        let from = (page - 1).saturating_mul(limit);
        let to = page.saturating_mul(limit) - 1;
        Some(Self { from, to })
    }

    /// Number of rows the window spans.
    pub fn row_count(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.to - self.from).saturating_add(1)
        }
    }
}

/// Column projection for returned rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Columns(Vec<String>),
}

impl Projection {
    /// Parses `"*"` or a comma-separated column list such as `"id, name"`.
    pub fn parse(raw: &str) -> Self {
        let columns: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .map(str::to_string)
            .collect();

        if columns.is_empty() || columns.iter().any(|column| column == "*") {
            Self::All
        } else {
            Self::Columns(columns)
        }
    }

    /// Applies the projection to a stored row. Missing columns project as NULL.
    pub fn apply(&self, row: &Row) -> Row {
        match self {
            Self::All => row.clone(),
            Self::Columns(columns) => columns
                .iter()
                .map(|column| {
                    (
                        column.clone(),
                        row.get(column).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect(),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::Columns(columns) => write!(f, "{}", columns.join(",")),
        }
    }
}

impl From<&str> for Projection {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for Projection {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&String> for Projection {
    fn from(raw: &String) -> Self {
        Self::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row_from;
    use serde_json::json;

    #[test]
    fn page_window_is_inclusive() {
        assert_eq!(Range::page(1, 10), Some(Range { from: 0, to: 9 }));
        assert_eq!(Range::page(3, 5), Some(Range { from: 10, to: 14 }));
        assert_eq!(Range::page(0, 5), None);
        assert_eq!(Range::page(2, 0), None);
    }

    #[test]
    fn inverted_window_is_empty() {
        assert_eq!(Range::new(5, 2).row_count(), 0);
        assert!(Range::new(5, 2).is_empty());
        assert_eq!(Range::new(3, 3).row_count(), 1);
        assert_eq!(Range::new(0, usize::MAX).row_count(), usize::MAX);
    }

    #[test]
    fn open_ended_window_does_not_overflow() {
        assert_eq!(Range::starting_at(10, usize::MAX), Range::new(10, usize::MAX));
        assert_eq!(Range::starting_at(4, 0), Range::new(4, 4));
    }

    #[test]
    fn projection_parses_and_applies() {
        assert_eq!(Projection::parse("*"), Projection::All);
        assert_eq!(Projection::parse(" "), Projection::All);

        let projection = Projection::parse("id, name");
        let row = row_from([("id", json!("a")), ("name", json!("x")), ("extra", json!(1))]);
        let projected = projection.apply(&row);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.get("name"), Some(&json!("x")));

        let with_missing = Projection::parse("id, missing").apply(&row);
        assert_eq!(with_missing.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn sort_direction_parses_case_insensitively() {
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!(SortDirection::default(), SortDirection::Desc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
