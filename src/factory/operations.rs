use super::batch::{BatchFailure, BatchOutcome, BatchUpdateItem, BatchUpdateMode};
use super::config::EntityConfig;
use super::params::{ListParams, match_column};
use super::source::RepositorySource;
use crate::core::{RepoError, Result, Row, now_timestamp};
use crate::query::{Repository, SelectQuery, SortDirection};
use crate::result::{Envelope, ErrorInfo};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

pub const DELETED_AT: &str = "deleted_at";
pub const UPDATED_AT: &str = "updated_at";

/// Rejects ids that cannot address a row.
pub(crate) fn require_id(id: Value) -> Result<Value> {
    match &id {
        Value::Null => Err(RepoError::Validation("id is required".into())),
        Value::String(s) if s.trim().is_empty() => {
            Err(RepoError::Validation("id is required".into()))
        }
        _ => Ok(id),
    }
}

/// Converts an operation result into an envelope, logging failures.
pub(crate) fn settle<T>(operation: &str, source: &str, result: Result<T>) -> Envelope<T> {
    if let Err(err) = &result {
        debug!("{operation} on '{source}' failed: {err}");
    }
    Envelope::from(result)
}

pub(crate) fn settle_optional<T>(
    operation: &str,
    source: &str,
    result: Result<Option<T>>,
) -> Envelope<T> {
    if let Err(err) = &result {
        debug!("{operation} on '{source}' failed: {err}");
    }
    Envelope::from_optional(result)
}

/// Typed CRUD and batch operations generated for one [`EntityConfig`].
///
/// Every public method returns an [`Envelope`]; errors never escape as `Err`.
pub struct EntityOperations<T, C = T, U = C> {
    config: Arc<EntityConfig<T, C, U>>,
    source: RepositorySource,
}

impl<T, C, U> Clone for EntityOperations<T, C, U> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            source: self.source.clone(),
        }
    }
}

impl<T, C, U> EntityOperations<T, C, U> {
    pub fn new(source: impl Into<RepositorySource>, config: EntityConfig<T, C, U>) -> Self {
        Self {
            config: Arc::new(config),
            source: source.into(),
        }
    }

    pub fn config(&self) -> &EntityConfig<T, C, U> {
        &self.config
    }

    /// Same configuration over a different repository source.
    pub fn with_source(&self, source: impl Into<RepositorySource>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            source: source.into(),
        }
    }

    pub fn repository(&self) -> Repository {
        self.source.resolve(&self.config.table)
    }

    fn table(&self) -> &str {
        &self.config.table
    }

    /// Select with the default projection, hiding soft-deleted rows.
    fn base_select(&self, repository: &Repository) -> SelectQuery {
        let query = repository.select(self.config.default_select.clone());
        if self.config.soft_delete {
            query.is_null(DELETED_AT)
        } else {
            query
        }
    }

    pub async fn get_all(&self, params: &ListParams) -> Envelope<Vec<T>> {
        let result = self.fetch_all(params).await;
        settle("get_all", self.table(), result)
    }

    async fn fetch_all(&self, params: &ListParams) -> Result<Vec<T>> {
        let repository = self.repository();
        let query = params.apply(self.base_select(&repository), &self.config.default_order_by);
        self.config.to_domain_all(query.execute().await?)
    }

    /// Looks up one row by id. A missing row is a success without data.
    pub async fn get_by_id(&self, id: impl Into<Value>) -> Envelope<T> {
        let result = self.fetch_by_id(id.into()).await;
        settle_optional("get_by_id", self.table(), result)
    }

    async fn fetch_by_id(&self, id: Value) -> Result<Option<T>> {
        let id = require_id(id)?;
        let repository = self.repository();
        let row = self
            .base_select(&repository)
            .eq(self.config.id_field.clone(), id)
            .maybe_single()
            .await?;
        row.map(|row| self.config.to_domain(row)).transpose()
    }

    /// Looks up several rows. An empty id list never reaches the backend.
    pub async fn get_by_ids<I, V>(&self, ids: I) -> Envelope<Vec<T>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Envelope::success(Vec::new());
        }
        let result = self.fetch_by_ids(ids).await;
        settle("get_by_ids", self.table(), result)
    }

    async fn fetch_by_ids(&self, ids: Vec<Value>) -> Result<Vec<T>> {
        let repository = self.repository();
        let rows = self
            .base_select(&repository)
            .in_(self.config.id_field.clone(), ids)
            .order(self.config.default_order_by.clone(), SortDirection::Desc)
            .execute()
            .await?;
        self.config.to_domain_all(rows)
    }

    /// Rows whose `field` equals `value`, in default order.
    /// Rows whose `field` equals `value`; a `null` value finds rows where the
    /// field is null.
    pub async fn find_by(&self, field: &str, value: impl Into<Value>) -> Envelope<Vec<T>> {
        let result = self.fetch_matching(field, value.into()).await;
        settle("find_by", self.table(), result)
    }

    async fn fetch_matching(&self, field: &str, value: Value) -> Result<Vec<T>> {
        let repository = self.repository();
        let query = match_column(self.base_select(&repository), field, value)
            .order(self.config.default_order_by.clone(), SortDirection::Desc);
        self.config.to_domain_all(query.execute().await?)
    }

    pub async fn create(&self, data: &C) -> Envelope<T> {
        let result = self.insert_one(data).await;
        settle("create", self.table(), result)
    }

    async fn insert_one(&self, data: &C) -> Result<T> {
        let row = self.config.create_row(data)?;
        let created = self
            .repository()
            .insert(vec![row])
            .select(self.config.default_select.clone())
            .single()
            .await?;
        self.config.to_domain(created)
    }

    pub async fn update(&self, id: impl Into<Value>, data: &U) -> Envelope<T> {
        let result = self.update_one(id.into(), data).await;
        settle("update", self.table(), result)
    }

    async fn update_one(&self, id: Value, data: &U) -> Result<T> {
        let id = require_id(id)?;
        let patch = self.config.update_row(data)?;
        let updated = self
            .repository()
            .update(patch)
            .eq(self.config.id_field.clone(), id)
            .select(self.config.default_select.clone())
            .single()
            .await?;
        self.config.to_domain(updated)
    }

    /// Deletes (or soft-deletes) one row. The data is `true` once the request
    /// succeeded; the deleted row is never returned.
    pub async fn delete(&self, id: impl Into<Value>) -> Envelope<bool> {
        let result = self.delete_where_id_in(vec![id.into()]).await;
        settle("delete", self.table(), result)
    }

    async fn delete_where_id_in(&self, ids: Vec<Value>) -> Result<bool> {
        let ids = ids.into_iter().map(require_id).collect::<Result<Vec<_>>>()?;
        let repository = self.repository();
        let id_field = self.config.id_field.clone();

        let affected = if self.config.soft_delete {
            repository
                .update(soft_delete_patch())
                .in_(id_field, ids)
                .execute()
                .await?
        } else {
            repository.delete().in_(id_field, ids).execute().await?
        };
        debug!("deleted {affected} row(s) from '{}'", self.table());
        Ok(true)
    }

    /// Inserts all items in one request. Empty input is a no-op success.
    pub async fn batch_create(&self, items: &[C]) -> Envelope<Vec<T>> {
        if items.is_empty() {
            return Envelope::success(Vec::new());
        }
        let result = self.insert_many(items).await;
        settle("batch_create", self.table(), result)
    }

    async fn insert_many(&self, items: &[C]) -> Result<Vec<T>> {
        let rows = items
            .iter()
            .map(|item| self.config.create_row(item))
            .collect::<Result<Vec<Row>>>()?;
        let created = self
            .repository()
            .insert(rows)
            .select(self.config.default_select.clone())
            .execute()
            .await?;
        self.config.to_domain_all(created)
    }

    /// Applies the updates one after another and stops at the first failure.
    ///
    /// Items before the failing one stay applied; only the failing item's
    /// error is reported. Use [`batch_update_detailed`](Self::batch_update_detailed)
    /// to see exactly which items went through.
    pub async fn batch_update(&self, items: &[BatchUpdateItem<U>]) -> Envelope<Vec<T>> {
        let outcome = self
            .run_batch_update(items, BatchUpdateMode::StopOnFirstError)
            .await;
        match outcome.first_failure() {
            Some(failure) => Envelope::failure(failure.error.clone()),
            None => Envelope::success(outcome.into_values()),
        }
    }

    /// Sequential, non-atomic batch update that reports every item's fate.
    pub async fn batch_update_detailed(
        &self,
        items: &[BatchUpdateItem<U>],
        mode: BatchUpdateMode,
    ) -> Envelope<BatchOutcome<T>> {
        Envelope::success(self.run_batch_update(items, mode).await)
    }

    async fn run_batch_update(
        &self,
        items: &[BatchUpdateItem<U>],
        mode: BatchUpdateMode,
    ) -> BatchOutcome<T> {
        let mut outcome = BatchOutcome::new();

        for (index, item) in items.iter().enumerate() {
            match self.update_one(item.id.clone(), &item.data).await {
                Ok(value) => outcome.succeeded.push((index, value)),
                Err(err) => {
                    debug!(
                        "batch_update on '{}' failed at item {index}: {err}",
                        self.table()
                    );
                    outcome.failed.push(BatchFailure {
                        index,
                        error: ErrorInfo::from(err),
                    });
                    if mode == BatchUpdateMode::StopOnFirstError {
                        outcome.not_attempted.extend(index + 1..items.len());
                        break;
                    }
                }
            }
        }

        outcome
    }

    /// Deletes every listed id in one request. Empty input is a no-op success.
    pub async fn batch_delete<I, V>(&self, ids: I) -> Envelope<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Envelope::success(true);
        }
        let result = self.delete_where_id_in(ids).await;
        settle("batch_delete", self.table(), result)
    }
}

fn soft_delete_patch() -> Row {
    let now = now_timestamp();
    let mut patch = Row::new();
    patch.insert(UPDATED_AT.to_string(), now.clone());
    patch.insert(DELETED_AT.to_string(), now);
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_ids_are_rejected() {
        assert!(require_id(Value::Null).unwrap_err().is_validation());
        assert!(require_id(json!("  ")).unwrap_err().is_validation());
        assert_eq!(require_id(json!(7)), Ok(json!(7)));
    }

    #[test]
    fn soft_delete_stamps_both_columns() {
        let patch = soft_delete_patch();
        assert_eq!(patch.get(UPDATED_AT), patch.get(DELETED_AT));
        assert!(patch.get(DELETED_AT).is_some_and(Value::is_string));
    }
}
