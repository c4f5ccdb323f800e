use super::pattern::eval_like;
use crate::core::value::{as_text, compare_values, values_equal};
use crate::core::{Result, Row};
use crate::query::{Filter, OrderBy, Range};
use serde_json::Value;
use std::cmp::Ordering;

fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn ilike_cell(row: &Row, column: &str, pattern: &str) -> Result<bool> {
    match as_text(cell(row, column)) {
        Some(text) => eval_like(&text, pattern, false),
        None => Ok(false),
    }
}

pub fn filter_matches(filter: &Filter, row: &Row) -> Result<bool> {
    match filter {
        Filter::Eq { column, value } => Ok(values_equal(cell(row, column), value)),
        Filter::In { column, values } => {
            let current = cell(row, column);
            Ok(values.iter().any(|candidate| values_equal(current, candidate)))
        }
        Filter::ILike { column, pattern } => ilike_cell(row, column, pattern),
        Filter::AnyILike { columns, pattern } => {
            for column in columns {
                if ilike_cell(row, column, pattern)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::IsNull { column } => Ok(cell(row, column).is_null()),
    }
}

/// All filters must hold (filters compose with AND).
pub fn row_matches(row: &Row, filters: &[Filter]) -> Result<bool> {
    for filter in filters {
        if !filter_matches(filter, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Stable multi-key sort. Descending keys reverse the ascending order, which
/// places NULLs first, as Postgres does for `DESC`.
pub fn sort_rows(rows: &mut [Row], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }

    rows.sort_by(|left, right| {
        for key in order {
            let ordering = compare_values(cell(left, &key.column), cell(right, &key.column));
            let ordering = if key.direction.is_ascending() {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

pub fn apply_range(rows: Vec<Row>, range: Option<Range>) -> Vec<Row> {
    match range {
        Some(range) => rows
            .into_iter()
            .skip(range.from)
            .take(range.row_count())
            .collect(),
        None => rows,
    }
}
