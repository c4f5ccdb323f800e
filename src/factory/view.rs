use super::config::ResponseTransform;
use super::operations::{require_id, settle, settle_optional};
use super::params::{ListParams, contains_pattern, match_column};
use super::source::RepositorySource;
use crate::core::{RepoError, Result, Row};
use crate::query::{Projection, ReadOnlyRepository, SelectQuery, SortDirection};
use crate::result::Envelope;
use crate::tags::{EntityType, TAG_ASSIGNMENTS_TABLE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Configuration for a read-only projected source such as a join-backed view.
pub struct ViewConfig<T> {
    pub source: String,
    pub id_field: String,
    pub default_select: Projection,
    pub default_order_by: String,

    /// Columns matched by [`ViewOperations::search`]
    pub search_fields: Vec<String>,

    /// Entity type whose tag assignments back [`ViewOperations::filter_by_tag_ids`]
    pub tag_scope: Option<EntityType>,

    transform_response: ResponseTransform<T>,
}

impl<T: DeserializeOwned + 'static> ViewConfig<T> {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_transform(source, |row: Row| {
            Ok(serde_json::from_value(Value::Object(row))?)
        })
    }
}

impl<T> ViewConfig<T> {
    pub fn with_transform<F>(source: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Row) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            id_field: "id".to_string(),
            default_select: Projection::All,
            default_order_by: "created_at".to_string(),
            search_fields: vec!["name".to_string()],
            tag_scope: None,
            transform_response: Arc::new(transform),
        }
    }

    pub fn id_field(mut self, column: impl Into<String>) -> Self {
        self.id_field = column.into();
        self
    }

    pub fn default_select(mut self, projection: impl Into<Projection>) -> Self {
        self.default_select = projection.into();
        self
    }

    pub fn default_order_by(mut self, column: impl Into<String>) -> Self {
        self.default_order_by = column.into();
        self
    }

    pub fn search_fields<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn tag_scope(mut self, entity_type: EntityType) -> Self {
        self.tag_scope = Some(entity_type);
        self
    }

    fn to_domain(&self, row: Row) -> Result<T> {
        (self.transform_response)(row)
    }

    fn to_domain_all(&self, rows: Vec<Row>) -> Result<Vec<T>> {
        rows.into_iter().map(|row| self.to_domain(row)).collect()
    }
}

impl<T> fmt::Debug for ViewConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewConfig")
            .field("source", &self.source)
            .field("id_field", &self.id_field)
            .field("search_fields", &self.search_fields)
            .field("tag_scope", &self.tag_scope)
            .finish_non_exhaustive()
    }
}

/// Read operations over a view.
///
/// The type holds only a [`ReadOnlyRepository`] and has no write methods, so
/// writes through a view do not compile:
///
/// ```compile_fail
/// # use entitykit::factory::{ViewConfig, ViewOperations};
/// # fn demo(view: ViewOperations<serde_json::Value>) {
/// let _ = view.create(&serde_json::json!({ "name": "x" }));
/// # }
/// ```
pub struct ViewOperations<T> {
    config: Arc<ViewConfig<T>>,
    source: RepositorySource,
}

impl<T> Clone for ViewOperations<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            source: self.source.clone(),
        }
    }
}

impl<T> ViewOperations<T> {
    pub fn new(source: impl Into<RepositorySource>, config: ViewConfig<T>) -> Self {
        Self {
            config: Arc::new(config),
            source: source.into(),
        }
    }

    pub fn config(&self) -> &ViewConfig<T> {
        &self.config
    }

    pub fn repository(&self) -> ReadOnlyRepository {
        self.source.resolve(&self.config.source).read_only()
    }

    fn name(&self) -> &str {
        &self.config.source
    }

    fn base_select(&self, repository: &ReadOnlyRepository) -> SelectQuery {
        repository.select(self.config.default_select.clone())
    }

    async fn run(&self, query: SelectQuery) -> Result<Vec<T>> {
        self.config.to_domain_all(query.execute().await?)
    }

    pub async fn get_all(&self, params: &ListParams) -> Envelope<Vec<T>> {
        let query = params.apply(
            self.base_select(&self.repository()),
            &self.config.default_order_by,
        );
        let result = self.run(query).await;
        settle("get_all", self.name(), result)
    }

    pub async fn get_by_id(&self, id: impl Into<Value>) -> Envelope<T> {
        let result = self.fetch_by_id(id.into()).await;
        settle_optional("get_by_id", self.name(), result)
    }

    async fn fetch_by_id(&self, id: Value) -> Result<Option<T>> {
        let id = require_id(id)?;
        let query = self
            .base_select(&self.repository())
            .eq(self.config.id_field.clone(), id);
        let row = query.maybe_single().await?;
        row.map(|row| self.config.to_domain(row)).transpose()
    }

    pub async fn get_by_ids<I, V>(&self, ids: I) -> Envelope<Vec<T>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Envelope::success(Vec::new());
        }
        let result = self.rows_with_ids(ids).await;
        settle("get_by_ids", self.name(), result)
    }

    async fn rows_with_ids(&self, ids: Vec<Value>) -> Result<Vec<T>> {
        let query = self
            .base_select(&self.repository())
            .in_(self.config.id_field.clone(), ids)
            .order(self.config.default_order_by.clone(), SortDirection::Desc);
        self.run(query).await
    }

    /// Rows whose `field` equals `value`; a `null` value finds rows where the
    /// field is null.
    pub async fn find_by(&self, field: &str, value: impl Into<Value>) -> Envelope<Vec<T>> {
        let query = match_column(self.base_select(&self.repository()), field, value.into())
            .order(self.config.default_order_by.clone(), SortDirection::Desc);
        let result = self.run(query).await;
        settle("find_by", self.name(), result)
    }

    /// Rows where any search field contains `term`, ignoring case.
    ///
    /// A blank term returns everything in default order.
    pub async fn search(&self, term: &str) -> Envelope<Vec<T>> {
        let result = self.search_rows(term.trim()).await;
        settle("search", self.name(), result)
    }

    async fn search_rows(&self, term: &str) -> Result<Vec<T>> {
        let mut query = self.base_select(&self.repository());
        if !term.is_empty() {
            query = query.or_ilike(self.config.search_fields.iter().cloned(), contains_pattern(term));
        }
        query = query.order(self.config.default_order_by.clone(), SortDirection::Desc);
        self.run(query).await
    }

    /// Rows carrying any of `tag_ids`, resolved through the tag assignments of
    /// the configured tag scope. Empty input returns no rows without a request.
    pub async fn filter_by_tag_ids<I, S>(&self, tag_ids: I) -> Envelope<Vec<T>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tag_ids: Vec<String> = tag_ids.into_iter().map(Into::into).collect();
        if tag_ids.is_empty() {
            return Envelope::success(Vec::new());
        }
        let result = self.rows_tagged_with(tag_ids).await;
        settle("filter_by_tag_ids", self.name(), result)
    }

    async fn rows_tagged_with(&self, tag_ids: Vec<String>) -> Result<Vec<T>> {
        let scope = self.config.tag_scope.ok_or_else(|| {
            RepoError::Validation(format!("view '{}' has no tag scope", self.config.source))
        })?;

        let assignments = self
            .repository()
            .for_source(TAG_ASSIGNMENTS_TABLE)
            .select("target_id")
            .in_("tag_id", tag_ids)
            .eq("target_type", scope.as_str())
            .execute()
            .await?;

        let targets: BTreeSet<String> = assignments
            .iter()
            .filter_map(|row| row.get("target_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        self.rows_with_ids(targets.into_iter().map(Value::String).collect())
            .await
    }
}
