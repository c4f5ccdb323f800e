use super::eval::{apply_range, row_matches, sort_rows};
use crate::core::value::values_equal;
use crate::core::{RepoError, Result, Row, now_timestamp};
use crate::core::error::UNIQUE_VIOLATION_CODE;
use crate::query::{Filter, OnConflict, SelectRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape and defaults of a table held by the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    /// Fill a missing primary key with a random UUID on insert.
    #[serde(default)]
    pub generate_id: bool,
    /// Fill a missing `created_at` with the current time on insert.
    #[serde(default)]
    pub timestamps: bool,
    /// Additional unique keys (each a list of columns).
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    /// Views accept reads only.
    #[serde(default)]
    pub read_only: bool,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            generate_id: true,
            timestamps: true,
            unique: Vec::new(),
            read_only: false,
        }
    }

    /// Read-only source, e.g. a join-backed aggregate view.
    pub fn view(name: impl Into<String>) -> Self {
        Self {
            generate_id: false,
            timestamps: false,
            read_only: true,
            ..Self::new(name)
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique
            .push(columns.iter().map(|column| column.to_string()).collect());
        self
    }

    pub fn without_generated_id(mut self) -> Self {
        self.generate_id = false;
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    fn unique_keys(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        std::iter::once(vec![self.primary_key.clone()]).chain(self.unique.iter().cloned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableData {
    pub schema: TableSchema,
    #[serde(default)]
    pub rows: Vec<Row>,
}

fn same_key(left: &Row, right: &Row, columns: &[String]) -> bool {
    columns.iter().all(|column| match (left.get(column), right.get(column)) {
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    })
}

fn has_full_key(row: &Row, columns: &[String]) -> bool {
    columns
        .iter()
        .all(|column| row.get(column).is_some_and(|value| !value.is_null()))
}

impl TableData {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn ensure_writable(&self) -> Result<()> {
        if self.schema.read_only {
            return Err(RepoError::from_backend(
                "55000",
                format!("cannot write to read-only source \"{}\"", self.schema.name),
                None,
            ));
        }
        Ok(())
    }

    /// Fills generated columns the way database defaults would.
    pub fn with_defaults(&self, mut row: Row) -> Row {
        if self.schema.generate_id
            && row.get(&self.schema.primary_key).is_none_or(Value::is_null)
        {
            row.insert(
                self.schema.primary_key.clone(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if self.schema.timestamps && row.get("created_at").is_none_or(Value::is_null) {
            row.insert("created_at".to_string(), now_timestamp());
        }
        row
    }

    fn conflict_with(rows: &[Row], candidate: &Row, columns: &[String], skip: Option<usize>) -> Option<usize> {
        if !has_full_key(candidate, columns) {
            return None;
        }
        rows.iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != skip)
            .find(|(_, existing)| same_key(existing, candidate, columns))
            .map(|(index, _)| index)
    }

    fn check_unique(&self, rows: &[Row], candidate: &Row, skip: Option<usize>) -> Result<()> {
        for columns in self.schema.unique_keys() {
            if Self::conflict_with(rows, candidate, &columns, skip).is_some() {
                return Err(RepoError::ConstraintViolation {
                    code: UNIQUE_VIOLATION_CODE.to_string(),
                    message: format!(
                        "duplicate key value violates unique constraint \"{}_{}_key\"",
                        self.schema.name,
                        columns.join("_")
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn select(&self, request: &SelectRequest) -> Result<Vec<Row>> {
        let mut matched = Vec::new();
        for row in &self.rows {
            if row_matches(row, &request.filters)? {
                matched.push(row.clone());
            }
        }

        sort_rows(&mut matched, &request.order);
        Ok(apply_range(matched, request.range)
            .iter()
            .map(|row| request.projection.apply(row))
            .collect())
    }

    /// Inserts all rows or none. Returns the rows actually written.
    pub fn insert(&mut self, rows: &[Row], on_conflict: Option<&OnConflict>) -> Result<Vec<Row>> {
        let mut staged = self.rows.clone();
        let mut written = Vec::with_capacity(rows.len());

        for row in rows {
            let row = self.with_defaults(row.clone());

            if let Some(conflict) = on_conflict {
                if let Some(index) = Self::conflict_with(&staged, &row, &conflict.columns, None) {
                    if conflict.ignore_duplicates {
                        continue;
                    }
                    let mut merged = staged[index].clone();
                    for (column, value) in row {
                        if column != self.schema.primary_key {
                            merged.insert(column, value);
                        }
                    }
                    self.check_unique(&staged, &merged, Some(index))?;
                    staged[index] = merged.clone();
                    written.push(merged);
                    continue;
                }
            }

            self.check_unique(&staged, &row, None)?;
            staged.push(row.clone());
            written.push(row);
        }

        self.rows = staged;
        Ok(written)
    }

    /// Applies `patch` to every row matching `filters`; all or nothing.
    pub fn update(&mut self, patch: &Row, filters: &[Filter]) -> Result<Vec<Row>> {
        let mut staged = self.rows.clone();
        let mut touched = Vec::new();

        for index in 0..staged.len() {
            if !row_matches(&staged[index], filters)? {
                continue;
            }
            let mut updated = staged[index].clone();
            for (column, value) in patch {
                updated.insert(column.clone(), value.clone());
            }
            self.check_unique(&staged, &updated, Some(index))?;
            staged[index] = updated.clone();
            touched.push(updated);
        }

        self.rows = staged;
        Ok(touched)
    }

    pub fn delete(&mut self, filters: &[Filter]) -> Result<Vec<Row>> {
        let mut hits = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            hits.push(row_matches(row, filters)?);
        }

        let mut kept = Vec::with_capacity(self.rows.len());
        let mut removed = Vec::new();
        for (row, hit) in std::mem::take(&mut self.rows).into_iter().zip(hits) {
            if hit {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row_from;
    use serde_json::json;

    fn tags_table() -> TableData {
        TableData::new(TableSchema::new("tags").unique(&["name"]))
    }

    #[test]
    fn insert_fills_id_and_created_at() {
        let mut table = tags_table();
        let written = table.insert(&[row_from([("name", json!("x"))])], None).unwrap();
        assert!(written[0].get("id").and_then(Value::as_str).is_some());
        assert!(written[0].get("created_at").is_some());
    }

    #[test]
    fn unique_violation_rolls_back_whole_batch() {
        let mut table = tags_table();
        let err = table
            .insert(
                &[row_from([("name", json!("x"))]), row_from([("name", json!("x"))])],
                None,
            )
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn upsert_ignoring_duplicates_skips_existing() {
        let mut table = tags_table();
        table.insert(&[row_from([("name", json!("x"))])], None).unwrap();
        let conflict = OnConflict {
            columns: vec!["name".into()],
            ignore_duplicates: true,
        };
        let written = table
            .insert(&[row_from([("name", json!("x"))])], Some(&conflict))
            .unwrap();
        assert!(written.is_empty());
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn read_only_rejects_writes() {
        let table = TableData::new(TableSchema::view("people_view"));
        assert!(table.ensure_writable().is_err());
    }
}
