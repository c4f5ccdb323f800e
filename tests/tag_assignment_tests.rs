use async_trait::async_trait;
use entitykit::core::row_from;
use entitykit::query::{QueryRequest, RequestKind};
use entitykit::tags::{ENTITY_TYPE_TAGS_TABLE, TAG_ASSIGNMENTS_TABLE, TAGS_TABLE, table_schemas};
use entitykit::{
    Backend, Client, ClientConfig, ClientMode, EntityType, EntityTypeSet, Fault, InMemoryBackend,
    NewTag, ReadinessPolicy, RepoError, Row, Session, TagPatch, TagService,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn setup() -> (Arc<InMemoryBackend>, TagService) {
    let backend = Arc::new(InMemoryBackend::with_tables(table_schemas()));
    let service = TagService::new(Client::production(backend.clone()), EntityTypeSet::all());
    (backend, service)
}

async fn indexed(backend: &InMemoryBackend, tag_id: &str, entity_type: &str) -> bool {
    backend
        .rows(ENTITY_TYPE_TAGS_TABLE)
        .await
        .unwrap()
        .iter()
        .any(|row| row["tag_id"] == json!(tag_id) && row["entity_type"] == json!(entity_type))
}

async fn assign(service: &TagService, tag: &str, target: &str, kind: &str) -> String {
    service
        .assign_tag(tag, target, kind)
        .await
        .into_data()
        .unwrap()
        .id
}

#[tokio::test]
async fn test_index_follows_last_assignment_of_pair() {
    let (backend, service) = setup();

    let first = assign(&service, "t1", "e1", "event").await;
    assert!(indexed(&backend, "t1", "event").await);
    let second = assign(&service, "t1", "e2", "event").await;

    let removed = service.remove_tag_assignment(&first).await;
    assert_eq!(removed.into_data(), Some(true));
    assert!(indexed(&backend, "t1", "event").await);

    service.remove_tag_assignment(&second).await;
    assert!(!indexed(&backend, "t1", "event").await);
}

#[tokio::test]
async fn test_index_rows_are_per_entity_type() {
    let (backend, service) = setup();

    let event = assign(&service, "t1", "e1", "event").await;
    assign(&service, "t1", "p1", "person").await;

    service.remove_tag_assignment(&event).await;
    assert!(!indexed(&backend, "t1", "event").await);
    assert!(indexed(&backend, "t1", "person").await);
}

#[tokio::test]
async fn test_invalid_entity_type_is_rejected_before_any_request() {
    let (backend, service) = setup();

    let result = service.assign_tag("t1", "x1", "spaceship").await;
    assert!(result.is_error());
    assert_eq!(
        result.error().map(|e| e.code.as_str()),
        Some("INVALID_ENTITY_TYPE")
    );
    assert_eq!(backend.request_count(), 0);

    let restricted = TagService::new(
        Client::production(backend.clone()),
        EntityTypeSet::new([EntityType::Person]),
    );
    assert!(restricted.assign_tag("t1", "e1", "event").await.is_error());
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_removing_twice_does_not_touch_healthy_pair() {
    let (backend, service) = setup();
    let first = assign(&service, "t1", "e1", "event").await;
    assign(&service, "t1", "e2", "event").await;

    assert_eq!(service.remove_tag_assignment(&first).await.into_data(), Some(true));
    let again = service.remove_tag_assignment(&first).await;
    assert!(again.is_success());
    assert_eq!(again.into_data(), Some(false));
    assert!(indexed(&backend, "t1", "event").await);
}

#[tokio::test]
async fn test_index_is_written_before_assignment() {
    let (backend, service) = setup();
    backend
        .inject_fault(
            Fault::new(RepoError::from_backend("XX000", "insert failed", None))
                .on_table(TAG_ASSIGNMENTS_TABLE)
                .on_kind(RequestKind::Insert),
        )
        .unwrap();

    assert!(service.assign_tag("t1", "e1", "event").await.is_error());
    assert!(indexed(&backend, "t1", "event").await);
    assert!(backend.rows(TAG_ASSIGNMENTS_TABLE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_index_write_blocks_assignment() {
    let (backend, service) = setup();
    backend
        .inject_fault(
            Fault::new(RepoError::from_backend("XX000", "index unavailable", None))
                .on_table(ENTITY_TYPE_TAGS_TABLE),
        )
        .unwrap();

    assert!(service.assign_tag("t1", "e1", "event").await.is_error());
    assert!(backend.rows(TAG_ASSIGNMENTS_TABLE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_index_cleanup_leaves_stale_row_only() {
    let (backend, service) = setup();
    let id = assign(&service, "t1", "e1", "event").await;
    backend
        .inject_fault(
            Fault::new(RepoError::from_backend("XX000", "index unavailable", None))
                .on_table(ENTITY_TYPE_TAGS_TABLE)
                .on_kind(RequestKind::Delete),
        )
        .unwrap();

    assert_eq!(service.remove_tag_assignment(&id).await.into_data(), Some(true));
    assert!(backend.rows(TAG_ASSIGNMENTS_TABLE).await.unwrap().is_empty());
    assert!(indexed(&backend, "t1", "event").await);

    let report = service.reconcile_entity_type_index().await.into_data().unwrap();
    assert_eq!(report.stale.len(), 1);
    assert!(!indexed(&backend, "t1", "event").await);
}

#[tokio::test]
async fn test_assigning_twice_returns_existing_assignment() {
    let (backend, service) = setup();

    let first = assign(&service, "t1", "e1", "event").await;
    let second = assign(&service, "t1", "e1", "event").await;
    assert_eq!(first, second);
    assert_eq!(backend.rows(TAG_ASSIGNMENTS_TABLE).await.unwrap().len(), 1);
    assert_eq!(backend.rows(ENTITY_TYPE_TAGS_TABLE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_entity_tag_reads() {
    let (_, service) = setup();
    let rust = service.create_tag(&NewTag::named("rust")).await.into_data().unwrap();
    let async_tag = service.create_tag(&NewTag::named("async")).await.into_data().unwrap();

    assign(&service, &rust.id, "e1", "event").await;
    assign(&service, &async_tag.id, "e1", "event").await;
    assign(&service, &rust.id, "p1", "person").await;

    let tags = service.get_entity_tags("e1", "event").await.into_data().unwrap();
    let names: Vec<_> = tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec!["async", "rust"]);

    let all = service.get_entities_with_tag(&rust.id, None).await.into_data().unwrap();
    assert_eq!(all.len(), 2);
    let people = service
        .get_entities_with_tag(&rust.id, Some("person"))
        .await
        .into_data()
        .unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].target_type, EntityType::Person);

    let types = service.get_entity_types_for_tag(&rust.id).await.into_data().unwrap();
    assert_eq!(types, vec![EntityType::Person, EntityType::Event]);
}

#[tokio::test]
async fn test_reads_with_unknown_entity_type_are_empty_successes() {
    let (backend, service) = setup();

    let tags = service.get_entity_tags("e1", "spaceship").await;
    assert!(tags.is_success());
    assert_eq!(tags.into_data(), Some(Vec::new()));

    let entities = service.get_entities_with_tag("t1", Some("spaceship")).await;
    assert_eq!(entities.into_data(), Some(Vec::new()));

    let selection = service.get_tags_for_entity_type("spaceship").await;
    assert_eq!(selection.into_data(), Some(Vec::new()));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_remove_tag_from_entity() {
    let (backend, service) = setup();
    assign(&service, "t1", "e1", "event").await;

    let removed = service.remove_tag_from_entity("t1", "e1", "event").await;
    assert_eq!(removed.into_data(), Some(true));
    assert!(!indexed(&backend, "t1", "event").await);

    let nothing = service.remove_tag_from_entity("t1", "e1", "event").await;
    assert_eq!(nothing.into_data(), Some(false));
}

#[tokio::test]
async fn test_set_entity_tags_replaces_assignments() {
    let (backend, service) = setup();
    assign(&service, "t1", "e1", "event").await;
    assign(&service, "t2", "e1", "event").await;

    let after = service
        .set_entity_tags("e1", "event", ["t2", "t3"])
        .await
        .into_data()
        .unwrap();
    let mut tag_ids: Vec<_> = after.iter().map(|a| a.tag_id.as_str()).collect();
    tag_ids.sort();
    assert_eq!(tag_ids, vec!["t2", "t3"]);

    assert!(!indexed(&backend, "t1", "event").await);
    assert!(indexed(&backend, "t2", "event").await);
    assert!(indexed(&backend, "t3", "event").await);

    let cleared = service
        .set_entity_tags("e1", "event", Vec::<String>::new())
        .await
        .into_data()
        .unwrap();
    assert!(cleared.is_empty());
    assert!(backend.rows(ENTITY_TYPE_TAGS_TABLE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tag_crud() {
    let (_, service) = setup();

    let created = service
        .create_tag(&NewTag::named("  music ").description("sounds"))
        .await
        .into_data()
        .unwrap();
    assert_eq!(created.name, "music");
    assert_eq!(created.description.as_deref(), Some("sounds"));

    let renamed = service
        .update_tag(
            &created.id,
            &TagPatch {
                name: Some("live music".into()),
                description: None,
            },
        )
        .await
        .into_data()
        .unwrap();
    assert_eq!(renamed.name, "live music");

    let found = service.search_tags("LIVE").await.into_data().unwrap();
    assert_eq!(found.len(), 1);

    let blank = service.create_tag(&NewTag::named("   ")).await;
    assert!(blank.is_error());

    assert_eq!(service.delete_tag(&created.id).await.into_data(), Some(true));
    assert!(service.get_tag(&created.id).await.data().is_none());
}

#[tokio::test]
async fn test_assigned_tag_cannot_be_deleted() {
    let (backend, service) = setup();
    let tag = service.create_tag(&NewTag::named("busy")).await.into_data().unwrap();
    let assignment = assign(&service, &tag.id, "e1", "event").await;

    let refused = service.delete_tag(&tag.id).await;
    assert!(refused.is_error());
    assert_eq!(backend.rows(TAGS_TABLE).await.unwrap().len(), 1);

    service.remove_tag_assignment(&assignment).await;
    assert_eq!(service.delete_tag(&tag.id).await.into_data(), Some(true));
}

#[tokio::test]
async fn test_find_or_create_reuses_existing_tag() {
    let (backend, service) = setup();

    let first = service.find_or_create_tag("art").await.into_data().unwrap();
    let second = service.find_or_create_tag(" art ").await.into_data().unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(backend.rows(TAGS_TABLE).await.unwrap().len(), 1);
}

/// Another writer creates the tag between our lookup and our insert.
struct RacingBackend {
    inner: InMemoryBackend,
    raced: AtomicBool,
}

#[async_trait]
impl Backend for RacingBackend {
    fn name(&self) -> &str {
        "racing"
    }

    async fn execute(&self, request: &QueryRequest) -> entitykit::Result<Vec<Row>> {
        if let QueryRequest::Insert(insert) = request {
            if insert.table == TAGS_TABLE && !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.seed(TAGS_TABLE, insert.rows.clone()).await?;
            }
        }
        self.inner.execute(request).await
    }

    async fn current_session(&self) -> entitykit::Result<Option<Session>> {
        self.inner.current_session().await
    }
}

#[tokio::test]
async fn test_find_or_create_tolerates_concurrent_creator() {
    let backend = Arc::new(RacingBackend {
        inner: InMemoryBackend::with_tables(table_schemas()),
        raced: AtomicBool::new(false),
    });
    let service = TagService::new(Client::production(backend.clone()), EntityTypeSet::all());

    let tag = service.find_or_create_tag("race").await;
    assert!(tag.is_success());
    assert_eq!(tag.into_data().map(|t| t.name), Some("race".to_string()));
    assert_eq!(backend.inner.rows(TAGS_TABLE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_repairs_drift() {
    let (backend, service) = setup();
    backend
        .seed(
            TAG_ASSIGNMENTS_TABLE,
            vec![row_from([("tag_id", "t1"), ("target_id", "e1"), ("target_type", "event")])],
        )
        .await
        .unwrap();
    backend
        .seed(
            ENTITY_TYPE_TAGS_TABLE,
            vec![row_from([("tag_id", "t9"), ("entity_type", "group")])],
        )
        .await
        .unwrap();

    let report = service.reconcile_entity_type_index().await.into_data().unwrap();
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].tag_id, "t1");
    assert_eq!(report.stale.len(), 1);
    assert_eq!(report.stale[0].entity_type, EntityType::Group);

    assert!(indexed(&backend, "t1", "event").await);
    assert!(!indexed(&backend, "t9", "group").await);

    let again = service.reconcile_entity_type_index().await.into_data().unwrap();
    assert!(again.is_consistent());
}

#[tokio::test]
async fn test_assignments_work_in_test_mode() {
    let backend = Arc::new(InMemoryBackend::with_tables(table_schemas()));
    backend.session_ready_after(2, Session::new("user-1", "token")).unwrap();
    let config = ClientConfig::new()
        .mode(ClientMode::Test)
        .readiness(ReadinessPolicy::new(5, Duration::from_millis(1)));
    let service = TagService::from_config(
        Client::new(backend.clone(), &config),
        EntityTypeSet::all(),
        &config,
    );

    assign(&service, "t1", "e1", "event").await;
    assert!(indexed(&backend, "t1", "event").await);
    assert!(backend.session_poll_count() >= 3);
}

#[tokio::test]
async fn test_get_assignment_by_id() {
    let (_, service) = setup();
    let id = assign(&service, "t1", "e1", "event").await;

    let found = service.get_assignment(&id).await.into_data().unwrap();
    assert_eq!(found.target_id, "e1");
    assert_eq!(found.target_type, EntityType::Event);

    let missing = service.get_assignment("nope").await;
    assert!(missing.is_success());
    assert!(missing.data().is_none());

    let blank = service.get_assignment("  ").await;
    assert_eq!(
        blank.error().map(|e| e.code.as_str()),
        Some("VALIDATION_ERROR")
    );
}
