use super::entity_type::{EntityType, EntityTypeSet};
use super::model::{EntityTypeTag, IndexReport, NewTag, Tag, TagAssignment, TagPatch};
use super::schema::{ENTITY_TYPE_TAGS_TABLE, TAG_ASSIGNMENTS_TABLE, TAGS_TABLE};
use crate::cache::{CacheInvalidator, CacheKey, InvalidationSink, SelectionCache};
use crate::client::{ClientConfig, ClientResolver};
use crate::core::{RepoError, Result, Row, row_from};
use crate::factory::operations::{require_id, settle, settle_optional};
use crate::factory::{
    EntityConfig, EntityOperations, ListParams, RepositorySource, ViewConfig, ViewOperations,
};
use crate::query::{Repository, SortDirection};
use crate::result::Envelope;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;

fn decode<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

fn require_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RepoError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn string_column(rows: &[Row], column: &str) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Validated `(tag, target, type)` triple for assignment mutations.
struct Target {
    tag_id: String,
    target_id: String,
    entity_type: EntityType,
}

/// Tags, tag assignments and the derived entity-type index.
///
/// The service is the only writer of the `entity_type_tags` index. An index
/// row for `(tag, entity type)` is inserted before the first assignment of
/// that pair and removed once a check finds no assignment left. The two steps
/// are not transactional, so a failure in between can leave a stale index row
/// but never an unindexed assignment.
#[derive(Clone)]
pub struct TagService {
    resolver: ClientResolver,
    entity_types: EntityTypeSet,
    tags: EntityOperations<Tag, NewTag, TagPatch>,
    catalog: ViewOperations<Tag>,
    cache: Arc<SelectionCache<Vec<Tag>>>,
    invalidator: CacheInvalidator,
}

impl TagService {
    pub fn new(resolver: impl Into<ClientResolver>, entity_types: EntityTypeSet) -> Self {
        Self::with_cache_capacity(
            resolver,
            entity_types,
            ClientConfig::default().selection_cache_capacity,
        )
    }

    /// Service sized from `config`.
    pub fn from_config(
        resolver: impl Into<ClientResolver>,
        entity_types: EntityTypeSet,
        config: &ClientConfig,
    ) -> Self {
        Self::with_cache_capacity(resolver, entity_types, config.selection_cache_capacity)
    }

    pub fn with_cache_capacity(
        resolver: impl Into<ClientResolver>,
        entity_types: EntityTypeSet,
        capacity: usize,
    ) -> Self {
        let resolver = resolver.into();
        let cache = Arc::new(SelectionCache::new(capacity));
        let invalidator =
            CacheInvalidator::new().with_sink(Arc::clone(&cache) as Arc<dyn InvalidationSink>);
        let tags = EntityOperations::new(
            RepositorySource::Config(resolver.clone()),
            EntityConfig::new(TAGS_TABLE),
        );
        let catalog = ViewOperations::new(
            RepositorySource::Config(resolver.clone()),
            ViewConfig::new(TAGS_TABLE),
        );

        Self {
            resolver,
            entity_types,
            tags,
            catalog,
            cache,
            invalidator,
        }
    }

    /// Registers an additional cache to invalidate on membership changes.
    pub fn with_sink(mut self, sink: Arc<dyn InvalidationSink>) -> Self {
        self.invalidator = self.invalidator.with_sink(sink);
        self
    }

    pub fn entity_types(&self) -> &EntityTypeSet {
        &self.entity_types
    }

    /// Read-only operations over the `tags` table. Tag writes go through
    /// [`TagService::create_tag`], [`TagService::update_tag`] and
    /// [`TagService::delete_tag`] so the selection caches stay current.
    pub fn tags(&self) -> &ViewOperations<Tag> {
        &self.catalog
    }

    pub fn cache(&self) -> &SelectionCache<Vec<Tag>> {
        &self.cache
    }

    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    /// Receiver for cache keys invalidated by this service.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.invalidator.subscribe()
    }

    fn repo(&self, table: &str) -> Repository {
        self.resolver.repository(table)
    }

    async fn invalidate(&self, entity_type: Option<EntityType>) {
        let key = CacheKey::for_entity_type(entity_type);
        let failures = self.invalidator.invalidate(key).await;
        if failures > 0 {
            debug!("{failures} sink(s) failed to invalidate {key}");
        }
    }

    fn target(&self, tag_id: &str, target_id: &str, target_type: &str) -> Result<Target> {
        Ok(Target {
            entity_type: self.entity_types.validate(target_type)?,
            tag_id: require_text("tag id", tag_id)?,
            target_id: require_text("target id", target_id)?,
        })
    }

    // ----- tags ---------------------------------------------------------

    pub async fn create_tag(&self, tag: &NewTag) -> Envelope<Tag> {
        let name = match require_text("tag name", &tag.name) {
            Ok(name) => name,
            Err(err) => return settle("create_tag", TAGS_TABLE, Err(err)),
        };
        let created = self
            .tags
            .create(&NewTag {
                name,
                ..tag.clone()
            })
            .await;
        self.invalidate(None).await;
        created
    }

    pub async fn update_tag(&self, id: &str, patch: &TagPatch) -> Envelope<Tag> {
        if let Some(Err(err)) = patch.name.as_deref().map(|name| require_text("tag name", name)) {
            return settle("update_tag", TAGS_TABLE, Err(err));
        }
        let updated = self.tags.update(id, patch).await;
        self.invalidate(None).await;
        updated
    }

    /// Deletes a tag that no assignment references any more.
    ///
    /// Assigned tags are rejected; callers remove the assignments first.
    pub async fn delete_tag(&self, id: &str) -> Envelope<bool> {
        let result = self.delete_unassigned_tag(id).await;
        if result.is_ok() {
            self.invalidate(None).await;
        }
        settle("delete_tag", TAGS_TABLE, result)
    }

    async fn delete_unassigned_tag(&self, id: &str) -> Result<bool> {
        let id = require_text("tag id", id)?;
        let in_use = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .select("id")
            .eq("tag_id", id.clone())
            .limit(1)
            .execute()
            .await?;
        if !in_use.is_empty() {
            return Err(RepoError::Validation(format!(
                "tag '{id}' is still assigned; remove its assignments first"
            )));
        }

        let removed = self.repo(TAGS_TABLE).delete().eq("id", id.clone()).execute().await?;
        let stale = self
            .repo(ENTITY_TYPE_TAGS_TABLE)
            .delete()
            .eq("tag_id", id)
            .execute()
            .await?;
        if stale > 0 {
            warn!("removed {stale} stale index row(s) while deleting a tag");
        }
        Ok(removed > 0)
    }

    pub async fn get_tag(&self, id: &str) -> Envelope<Tag> {
        self.catalog.get_by_id(id).await
    }

    pub async fn list_tags(&self, params: &ListParams) -> Envelope<Vec<Tag>> {
        self.catalog.get_all(params).await
    }

    /// Tags whose name contains `term`, alphabetically.
    pub async fn search_tags(&self, term: &str) -> Envelope<Vec<Tag>> {
        let params = ListParams::new()
            .search(term)
            .sort("name", SortDirection::Asc);
        self.catalog.get_all(&params).await
    }

    /// Returns the tag named `name`, creating it if needed.
    ///
    /// A concurrent creator winning the race shows up as a unique violation,
    /// which is answered by reading the winner's row.
    pub async fn find_or_create_tag(&self, name: &str) -> Envelope<Tag> {
        let result = self.find_or_create(name).await;
        settle("find_or_create_tag", TAGS_TABLE, result)
    }

    async fn find_or_create(&self, name: &str) -> Result<Tag> {
        let name = require_text("tag name", name)?;
        let repo = self.repo(TAGS_TABLE);

        if let Some(row) = repo.select("*").eq("name", name.clone()).maybe_single().await? {
            return decode(row);
        }

        let created = repo
            .insert(vec![row_from([("name", name.clone())])])
            .select("*")
            .single()
            .await;
        match created {
            Ok(row) => {
                self.invalidate(None).await;
                decode(row)
            }
            Err(err) if err.is_unique_violation() => {
                debug!("tag '{name}' created concurrently, reading it back");
                decode(repo.select("*").eq("name", name).single().await?)
            }
            Err(err) => Err(err),
        }
    }

    // ----- assignments --------------------------------------------------

    /// Applies a tag to one entity. Assigning an existing pair returns the
    /// existing assignment.
    pub async fn assign_tag(
        &self,
        tag_id: &str,
        target_id: &str,
        target_type: &str,
    ) -> Envelope<TagAssignment> {
        let target = match self.target(tag_id, target_id, target_type) {
            Ok(target) => target,
            Err(err) => return settle("assign_tag", TAG_ASSIGNMENTS_TABLE, Err(err)),
        };
        let result = self.insert_assignment(&target).await;
        self.invalidate(Some(target.entity_type)).await;
        settle("assign_tag", TAG_ASSIGNMENTS_TABLE, result)
    }

    async fn ensure_indexed(&self, tag_ids: &[String], entity_type: EntityType) -> Result<()> {
        let rows = tag_ids
            .iter()
            .map(|tag_id| {
                row_from([
                    ("tag_id", tag_id.as_str()),
                    ("entity_type", entity_type.as_str()),
                ])
            })
            .collect();
        self.repo(ENTITY_TYPE_TAGS_TABLE)
            .upsert(rows, &["tag_id", "entity_type"])
            .execute()
            .await?;
        Ok(())
    }

    async fn insert_assignment(&self, target: &Target) -> Result<TagAssignment> {
        // Index first: readers must never see an unindexed assignment.
        self.ensure_indexed(std::slice::from_ref(&target.tag_id), target.entity_type)
            .await?;

        let repo = self.repo(TAG_ASSIGNMENTS_TABLE);
        let inserted = repo
            .insert(vec![row_from([
                ("tag_id", target.tag_id.as_str()),
                ("target_id", target.target_id.as_str()),
                ("target_type", target.entity_type.as_str()),
            ])])
            .select("*")
            .single()
            .await;

        match inserted {
            Ok(row) => decode(row),
            Err(err) if err.is_unique_violation() => {
                let existing = repo
                    .select("*")
                    .eq("tag_id", target.tag_id.clone())
                    .eq("target_id", target.target_id.clone())
                    .eq("target_type", target.entity_type.as_str())
                    .single()
                    .await?;
                decode(existing)
            }
            Err(err) => Err(err),
        }
    }

    /// Drops the index row for `(tag_id, entity_type)` if no assignment of
    /// that pair is left. Returns whether a row was removed.
    async fn release_index(&self, tag_id: &str, entity_type: EntityType) -> Result<bool> {
        let remaining = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .select("id")
            .eq("tag_id", tag_id)
            .eq("target_type", entity_type.as_str())
            .limit(1)
            .execute()
            .await?;
        if !remaining.is_empty() {
            return Ok(false);
        }

        let removed = self
            .repo(ENTITY_TYPE_TAGS_TABLE)
            .delete()
            .eq("tag_id", tag_id)
            .eq("entity_type", entity_type.as_str())
            .execute()
            .await?;
        Ok(removed > 0)
    }

    /// Best-effort index cleanup after assignments were deleted.
    async fn release_index_logged(&self, tag_id: &str, entity_type: EntityType) {
        if let Err(err) = self.release_index(tag_id, entity_type).await {
            warn!("index row ({tag_id}, {entity_type}) may be stale: {err}");
        }
    }

    /// Removes one assignment by id.
    ///
    /// The data is `false` when the assignment did not exist; the index is
    /// left untouched in that case.
    pub async fn remove_tag_assignment(&self, assignment_id: &str) -> Envelope<bool> {
        let result = self.remove_assignment(assignment_id).await;
        if let Ok(Some(entity_type)) = &result {
            self.invalidate(Some(*entity_type)).await;
        }
        settle(
            "remove_tag_assignment",
            TAG_ASSIGNMENTS_TABLE,
            result.map(|removed| removed.is_some()),
        )
    }

    async fn remove_assignment(&self, assignment_id: &str) -> Result<Option<EntityType>> {
        let id = require_id(Value::String(assignment_id.trim().to_string()))?;
        let repo = self.repo(TAG_ASSIGNMENTS_TABLE);

        let Some(row) = repo.select("*").eq("id", id.clone()).maybe_single().await? else {
            debug!("assignment {assignment_id} already removed");
            return Ok(None);
        };
        let assignment: TagAssignment = decode(row)?;

        let removed = repo.delete().eq("id", id).execute().await?;
        if removed == 0 {
            // Lost a race with another remover; it owns the cleanup.
            return Ok(None);
        }

        self.release_index_logged(&assignment.tag_id, assignment.target_type)
            .await;
        Ok(Some(assignment.target_type))
    }

    /// Removes `tag_id` from one entity. The data is `false` when the entity
    /// did not carry the tag.
    pub async fn remove_tag_from_entity(
        &self,
        tag_id: &str,
        target_id: &str,
        target_type: &str,
    ) -> Envelope<bool> {
        let target = match self.target(tag_id, target_id, target_type) {
            Ok(target) => target,
            Err(err) => return settle("remove_tag_from_entity", TAG_ASSIGNMENTS_TABLE, Err(err)),
        };
        let result = self.unassign(&target).await;
        self.invalidate(Some(target.entity_type)).await;
        settle("remove_tag_from_entity", TAG_ASSIGNMENTS_TABLE, result)
    }

    async fn unassign(&self, target: &Target) -> Result<bool> {
        let removed = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .delete()
            .eq("tag_id", target.tag_id.clone())
            .eq("target_id", target.target_id.clone())
            .eq("target_type", target.entity_type.as_str())
            .execute()
            .await?;
        if removed > 0 {
            self.release_index_logged(&target.tag_id, target.entity_type)
                .await;
        }
        Ok(removed > 0)
    }

    /// Replaces the tags of one entity with `tag_ids`.
    ///
    /// New tags are indexed and assigned before dropped ones are removed.
    /// Returns the entity's assignments afterwards.
    pub async fn set_entity_tags<I, S>(
        &self,
        target_id: &str,
        target_type: &str,
        tag_ids: I,
    ) -> Envelope<Vec<TagAssignment>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prepared = self.entity_types.validate(target_type).and_then(|entity_type| {
            let target_id = require_text("target id", target_id)?;
            let desired = tag_ids
                .into_iter()
                .map(|tag_id| require_text("tag id", tag_id.as_ref()))
                .collect::<Result<BTreeSet<String>>>()?;
            Ok((target_id, entity_type, desired))
        });
        let (target_id, entity_type, desired) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return settle("set_entity_tags", TAG_ASSIGNMENTS_TABLE, Err(err)),
        };

        let result = self.retag(&target_id, entity_type, desired).await;
        self.invalidate(Some(entity_type)).await;
        settle("set_entity_tags", TAG_ASSIGNMENTS_TABLE, result)
    }

    async fn assignments_of(&self, target_id: &str, entity_type: EntityType) -> Result<Vec<TagAssignment>> {
        let rows = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .select("*")
            .eq("target_id", target_id)
            .eq("target_type", entity_type.as_str())
            .order("created_at", SortDirection::Asc)
            .execute()
            .await?;
        decode_all(rows)
    }

    async fn retag(
        &self,
        target_id: &str,
        entity_type: EntityType,
        desired: BTreeSet<String>,
    ) -> Result<Vec<TagAssignment>> {
        let current = self.assignments_of(target_id, entity_type).await?;
        let held: BTreeSet<&str> = current.iter().map(|a| a.tag_id.as_str()).collect();

        let to_add: Vec<String> = desired
            .iter()
            .filter(|tag_id| !held.contains(tag_id.as_str()))
            .cloned()
            .collect();
        let to_remove: Vec<&TagAssignment> = current
            .iter()
            .filter(|assignment| !desired.contains(&assignment.tag_id))
            .collect();

        if !to_add.is_empty() {
            self.ensure_indexed(&to_add, entity_type).await?;
            let rows = to_add
                .iter()
                .map(|tag_id| {
                    row_from([
                        ("tag_id", tag_id.as_str()),
                        ("target_id", target_id),
                        ("target_type", entity_type.as_str()),
                    ])
                })
                .collect();
            self.repo(TAG_ASSIGNMENTS_TABLE)
                .upsert(rows, &["tag_id", "target_id", "target_type"])
                .execute()
                .await?;
        }

        if !to_remove.is_empty() {
            let ids: Vec<&str> = to_remove.iter().map(|a| a.id.as_str()).collect();
            self.repo(TAG_ASSIGNMENTS_TABLE)
                .delete()
                .in_("id", ids)
                .execute()
                .await?;
            for assignment in &to_remove {
                self.release_index_logged(&assignment.tag_id, entity_type)
                    .await;
            }
        }

        self.assignments_of(target_id, entity_type).await
    }

    // ----- reads --------------------------------------------------------

    async fn tags_by_ids(&self, ids: BTreeSet<String>) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .repo(TAGS_TABLE)
            .select("*")
            .in_("id", ids)
            .order("name", SortDirection::Asc)
            .execute()
            .await?;
        decode_all(rows)
    }

    /// Tags applied to one entity, alphabetically. An unknown entity type
    /// yields an empty list.
    pub async fn get_entity_tags(&self, entity_id: &str, entity_type: &str) -> Envelope<Vec<Tag>> {
        let Ok(entity_type) = self.entity_types.validate(entity_type) else {
            debug!("get_entity_tags: unknown entity type '{entity_type}'");
            return Envelope::success(Vec::new());
        };
        let result = self.entity_tags(entity_id, entity_type).await;
        settle("get_entity_tags", TAG_ASSIGNMENTS_TABLE, result)
    }

    async fn entity_tags(&self, entity_id: &str, entity_type: EntityType) -> Result<Vec<Tag>> {
        let assignments = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .select("tag_id")
            .eq("target_id", entity_id)
            .eq("target_type", entity_type.as_str())
            .execute()
            .await?;
        self.tags_by_ids(string_column(&assignments, "tag_id")).await
    }

    /// Assignments of `tag_id`, optionally limited to one entity type. An
    /// unknown entity type yields an empty list.
    pub async fn get_entities_with_tag(
        &self,
        tag_id: &str,
        entity_type: Option<&str>,
    ) -> Envelope<Vec<TagAssignment>> {
        let entity_type = match entity_type.map(|raw| self.entity_types.validate(raw)) {
            None => None,
            Some(Ok(entity_type)) => Some(entity_type),
            Some(Err(err)) => {
                debug!("get_entities_with_tag: {err}");
                return Envelope::success(Vec::new());
            }
        };
        let result = self.tagged_entities(tag_id, entity_type).await;
        settle("get_entities_with_tag", TAG_ASSIGNMENTS_TABLE, result)
    }

    async fn tagged_entities(
        &self,
        tag_id: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<TagAssignment>> {
        let mut query = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .select("*")
            .eq("tag_id", tag_id);
        if let Some(entity_type) = entity_type {
            query = query.eq("target_type", entity_type.as_str());
        }
        decode_all(query.order("created_at", SortDirection::Desc).execute().await?)
    }

    /// Tags in use by at least one entity of `entity_type` (selection tags).
    ///
    /// Served from the selection cache under `selection_tags_<type>`.
    pub async fn get_tags_for_entity_type(&self, entity_type: &str) -> Envelope<Vec<Tag>> {
        let Ok(entity_type) = self.entity_types.validate(entity_type) else {
            debug!("get_tags_for_entity_type: unknown entity type '{entity_type}'");
            return Envelope::success(Vec::new());
        };
        let key = CacheKey::EntityType(entity_type);

        match self.cache.get(&key) {
            Ok(Some(tags)) => return Envelope::success(tags),
            Ok(None) => {}
            Err(err) => warn!("selection cache unavailable: {err}"),
        }

        // An invalidation racing the fetch must win over the fetched value.
        let generation = self.cache.generation();
        let result = self.selection_tags(entity_type).await;
        if let Ok(tags) = &result {
            match self.cache.insert_if_current(key, generation, tags.clone()) {
                Ok(true) => {}
                Ok(false) => debug!("{key} invalidated while loading; not caching"),
                Err(err) => warn!("could not cache {key}: {err}"),
            }
        }
        settle("get_tags_for_entity_type", ENTITY_TYPE_TAGS_TABLE, result)
    }

    async fn selection_tags(&self, entity_type: EntityType) -> Result<Vec<Tag>> {
        let index = self
            .repo(ENTITY_TYPE_TAGS_TABLE)
            .select("tag_id")
            .eq("entity_type", entity_type.as_str())
            .execute()
            .await?;
        self.tags_by_ids(string_column(&index, "tag_id")).await
    }

    /// Entity types currently using `tag_id`, per the index.
    pub async fn get_entity_types_for_tag(&self, tag_id: &str) -> Envelope<Vec<EntityType>> {
        let result = self.entity_types_for(tag_id).await;
        settle("get_entity_types_for_tag", ENTITY_TYPE_TAGS_TABLE, result)
    }

    async fn entity_types_for(&self, tag_id: &str) -> Result<Vec<EntityType>> {
        let tag_id = require_text("tag id", tag_id)?;
        let rows = self
            .repo(ENTITY_TYPE_TAGS_TABLE)
            .select("entity_type")
            .eq("tag_id", tag_id)
            .execute()
            .await?;
        let types: BTreeSet<EntityType> = string_column(&rows, "entity_type")
            .iter()
            .filter_map(|raw| match raw.parse() {
                Ok(entity_type) => Some(entity_type),
                Err(err) => {
                    debug!("skipping index row: {err}");
                    None
                }
            })
            .collect();
        Ok(types.into_iter().collect())
    }

    /// Looks up one assignment by id.
    pub async fn get_assignment(&self, assignment_id: &str) -> Envelope<TagAssignment> {
        let result = async {
            let id = require_id(Value::String(assignment_id.trim().to_string()))?;
            let row = self
                .repo(TAG_ASSIGNMENTS_TABLE)
                .select("*")
                .eq("id", id)
                .maybe_single()
                .await?;
            row.map(decode).transpose()
        }
        .await;
        settle_optional("get_assignment", TAG_ASSIGNMENTS_TABLE, result)
    }

    // ----- maintenance --------------------------------------------------

    /// Compares the index with the assignments and repairs any drift.
    ///
    /// Never runs on its own; call it from a maintenance job when stale index
    /// rows matter.
    pub async fn reconcile_entity_type_index(&self) -> Envelope<IndexReport> {
        let result = self.reconcile().await;
        if let Ok(report) = &result {
            if !report.is_consistent() {
                self.invalidate(None).await;
            }
        }
        settle("reconcile_entity_type_index", ENTITY_TYPE_TAGS_TABLE, result)
    }

    async fn reconcile(&self) -> Result<IndexReport> {
        let assignments = self
            .repo(TAG_ASSIGNMENTS_TABLE)
            .select("tag_id, target_type")
            .execute()
            .await?;
        let mut expected = BTreeSet::new();
        for row in &assignments {
            if let (Some(tag_id), Some(raw)) = (
                row.get("tag_id").and_then(Value::as_str),
                row.get("target_type").and_then(Value::as_str),
            ) {
                expected.insert(EntityTypeTag {
                    tag_id: tag_id.to_string(),
                    entity_type: raw.parse()?,
                });
            }
        }

        let indexed: BTreeSet<EntityTypeTag> = decode_all::<EntityTypeTag>(
            self.repo(ENTITY_TYPE_TAGS_TABLE)
                .select("tag_id, entity_type")
                .execute()
                .await?,
        )?
        .into_iter()
        .collect();

        let report = IndexReport {
            missing: expected.difference(&indexed).cloned().collect(),
            stale: indexed.difference(&expected).cloned().collect(),
        };

        let mut missing_by_type: BTreeMap<EntityType, Vec<String>> = BTreeMap::new();
        for pair in &report.missing {
            missing_by_type
                .entry(pair.entity_type)
                .or_default()
                .push(pair.tag_id.clone());
        }
        for (entity_type, tag_ids) in missing_by_type {
            self.ensure_indexed(&tag_ids, entity_type).await?;
        }
        for pair in &report.stale {
            self.release_index(&pair.tag_id, pair.entity_type).await?;
        }

        if !report.is_consistent() {
            warn!(
                "entity type index repaired: {} missing, {} stale",
                report.missing.len(),
                report.stale.len()
            );
        }
        Ok(report)
    }
}
