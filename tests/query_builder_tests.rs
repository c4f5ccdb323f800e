use entitykit::core::row_from;
use entitykit::query::QueryRequest;
use entitykit::{Client, InMemoryBackend, Projection, RepoError, Repository, SortDirection, TableSchema};
use serde_json::json;
use std::sync::Arc;

async fn people() -> (Arc<InMemoryBackend>, Repository) {
    let backend = Arc::new(InMemoryBackend::with_tables([
        TableSchema::new("people").unique(&["email"])
    ]));
    backend
        .seed(
            "people",
            vec![
                row_from([("id", json!("p1")), ("name", json!("Ada")), ("email", json!("ada@x.io")), ("age", json!(36))]),
                row_from([("id", json!("p2")), ("name", json!("Grace")), ("email", json!("grace@x.io")), ("age", json!(45))]),
                row_from([("id", json!("p3")), ("name", json!("alan")), ("email", json!("alan@x.io")), ("age", json!(41))]),
            ],
        )
        .await
        .unwrap();
    let repo = Client::production(backend.clone()).from_table("people");
    (backend, repo)
}

#[tokio::test]
async fn test_select_with_filters_order_and_range() {
    let (_, repo) = people().await;

    let rows = repo
        .select("id, name")
        .in_("id", ["p1", "p2", "p3"])
        .order("age", SortDirection::Desc)
        .range(0, 1)
        .execute()
        .await
        .unwrap();

    let names: Vec<_> = rows.iter().map(|row| row["name"].clone()).collect();
    assert_eq!(names, vec![json!("Grace"), json!("alan")]);
    assert_eq!(rows[0].len(), 2);
}

#[tokio::test]
async fn test_branching_from_shared_stage() {
    let (_, repo) = people().await;

    let base = repo.select("*").order("name", SortDirection::Asc);
    let only_ada = base.clone().eq("id", "p1");
    let adults = base.clone().in_("id", ["p2", "p3"]);

    assert!(base.request().filters.is_empty());
    assert_eq!(only_ada.execute().await.unwrap().len(), 1);
    assert_eq!(adults.execute().await.unwrap().len(), 2);
    assert_eq!(base.execute().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_maybe_single_distinguishes_missing_from_failure() {
    let (_, repo) = people().await;

    let missing = repo.select("*").eq("id", "nope").maybe_single().await.unwrap();
    assert!(missing.is_none());

    let many = repo.select("*").ilike("email", "%@x.io").maybe_single().await;
    assert_eq!(many.unwrap_err(), RepoError::NotSingle(3));

    let failed = repo.for_table("ghosts").select("*").maybe_single().await;
    assert!(matches!(failed, Err(RepoError::TableNotFound(_))));
}

#[tokio::test]
async fn test_ilike_ignores_case() {
    let (_, repo) = people().await;

    let rows = repo.select("name").ilike("name", "a%").execute().await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_writes_report_affected_rows() {
    let (backend, repo) = people().await;

    let updated = repo
        .update(row_from([("age", json!(37))]))
        .eq("id", "p1")
        .execute()
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let returned = repo
        .update(row_from([("age", json!(50))]))
        .in_("id", ["p2", "p3"])
        .select("id, age")
        .execute()
        .await
        .unwrap();
    assert_eq!(returned.len(), 2);
    assert!(returned.iter().all(|row| row["age"] == json!(50)));

    let removed = repo.delete().eq("id", "p3").execute().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(backend.rows("people").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unique_violation_is_classified() {
    let (backend, repo) = people().await;

    let err = repo
        .insert(vec![row_from([("name", json!("Copy")), ("email", json!("ada@x.io"))])])
        .execute()
        .await
        .unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(err.code(), "23505");
    assert_eq!(backend.rows("people").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_upsert_skips_or_merges_conflicts() {
    let (backend, repo) = people().await;

    let skipped = repo
        .upsert(
            vec![row_from([("name", json!("Dup")), ("email", json!("ada@x.io"))])],
            &["email"],
        )
        .execute()
        .await
        .unwrap();
    assert_eq!(skipped, 0);

    let merged = repo
        .upsert_merge(
            vec![row_from([("name", json!("Ada L.")), ("email", json!("ada@x.io"))])],
            &["email"],
        )
        .select("id, name")
        .single()
        .await
        .unwrap();
    assert_eq!(merged["id"], json!("p1"));
    assert_eq!(merged["name"], json!("Ada L."));
    assert_eq!(backend.rows("people").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_inserted_rows_get_generated_columns() {
    let (_, repo) = people().await;

    let row = repo
        .insert(vec![row_from([("name", json!("Barbara")), ("email", json!("b@x.io"))])])
        .select("*")
        .single()
        .await
        .unwrap();

    assert!(row["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(row["created_at"].is_string());
}

#[tokio::test]
async fn test_with_client_swaps_backend_only() {
    let (_, repo) = people().await;
    let other = Arc::new(InMemoryBackend::with_tables([TableSchema::new("people")]));

    let swapped = repo.with_client(Client::production(other.clone()));
    assert_eq!(swapped.table(), "people");
    assert!(swapped.select("*").execute().await.unwrap().is_empty());
    assert_eq!(other.request_count(), 1);
}

#[tokio::test]
async fn test_views_reject_writes_at_the_backend() {
    let backend = Arc::new(InMemoryBackend::with_tables([TableSchema::view("people_view")]));
    let client = Client::production(backend.clone());

    let err = client
        .from_table("people_view")
        .insert(vec![row_from([("name", json!("x"))])])
        .execute()
        .await
        .unwrap_err();
    assert_eq!(err.code(), "55000");

    let rows = client.from_view("people_view").select("*").execute().await.unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_built_requests_are_inspectable() {
    let client = Client::production(Arc::new(InMemoryBackend::new()));
    let request = client
        .from_table("people")
        .delete()
        .eq("id", "p1")
        .into_request();

    match request {
        QueryRequest::Delete(delete) => {
            assert_eq!(delete.table, "people");
            assert_eq!(delete.filters.len(), 1);
        }
        other => panic!("unexpected request {other:?}"),
    }
    assert_eq!(Projection::parse("id,name").to_string(), "id,name");
}

#[tokio::test]
async fn test_inverted_range_returns_nothing() {
    let (_, repo) = people().await;

    let rows = repo.select("*").order("age", SortDirection::Asc).range(2, 1).execute().await.unwrap();
    assert!(rows.is_empty());

    let capped = repo
        .select("id")
        .order("age", SortDirection::Asc)
        .range(1, 1)
        .limit(usize::MAX)
        .execute()
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
}
