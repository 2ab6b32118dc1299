//! Cleanup plans run against the in-memory store and catalog.

use ctas_athena::*;
use ctas_storage::{ObjectStoreResultStore, StaticBuckets};

use crate::support::*;

async fn started(h: &Harness) -> QueryLifecycle {
    QueryLifecycle::start(
        h.request("select * from db.t", SECOND),
        h.clients.clone(),
        Harness::settings(),
    )
    .await
    .unwrap()
}

fn staged_script() -> Script {
    Script::new()
        .then_forever(EngineState::Succeeded)
        .stage(parquet_file(&[1], &["a"]))
}

#[tokio::test]
async fn running_a_plan_twice_is_harmless() {
    let h = Harness::new(staged_script());
    let q = started(&h).await;
    let plan = q.cleanup_plan();

    let first = plan
        .execute(h.clients.store.as_ref(), h.clients.catalog.as_ref())
        .await
        .unwrap();
    assert_eq!(first.objects_deleted, 2);
    assert!(first.table_dropped);

    let second = plan
        .execute(h.clients.store.as_ref(), h.clients.catalog.as_ref())
        .await
        .unwrap();
    assert_eq!(second.objects_deleted, 0);
    assert!(!second.table_dropped);
    assert!(second.is_complete());

    // finish() is the third run of the same plan.
    let third = q.finish().await.unwrap();
    assert!(third.is_complete());
    assert!(h.catalog.is_empty());
}

#[tokio::test]
async fn edited_prefix_deletes_nothing() {
    let h = Harness::new(staged_script());
    h.put("tables/keep/part-00000").await;
    let q = started(&h).await;

    // Outside the sentinel, or widened to the directory shared by all queries.
    for prefix in ["tables", "__athena_temp__/tables/", "__athena_temp__"] {
        let mut plan = q.cleanup_plan();
        plan.prefix = prefix.into();
        let err = plan
            .execute(h.clients.store.as_ref(), h.clients.catalog.as_ref())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsafeCleanup, "{prefix}");
        assert!(err.to_string().contains(SENTINEL_DIR));
        assert_eq!(h.keys().await.len(), 3);
        assert_eq!(h.catalog.len(), 1);
    }

    // The untouched plan still cleans up the generated artifacts only.
    q.finish().await.unwrap().into_result().unwrap();
    assert_eq!(h.keys().await, vec!["tables/keep/part-00000"]);
    assert!(h.catalog.is_empty());
}

#[tokio::test]
async fn catalog_deletion_survives_storage_failure() {
    let h = Harness::new(staged_script());
    let q = started(&h).await;

    let mut buckets = StaticBuckets::new();
    buckets.add_memory(BUCKET);
    let broken = BrokenStore(ObjectStoreResultStore::new(buckets));

    let report = q
        .cleanup_plan()
        .execute(&broken, h.clients.catalog.as_ref())
        .await
        .unwrap();

    assert!(report.table_dropped);
    assert_eq!(report.storage_error.as_deref(), Some("S3 error: AccessDenied"));
    assert!(report.catalog_error.is_none());
    assert!(h.catalog.is_empty());

    q.finish().await.unwrap();
}

#[tokio::test]
async fn storage_deletion_survives_catalog_failure() {
    let h = Harness::new(staged_script());
    let q = started(&h).await;

    let report = q
        .cleanup_plan()
        .execute(h.clients.store.as_ref(), &BrokenCatalog)
        .await
        .unwrap();

    assert_eq!(report.objects_deleted, 2);
    assert!(!report.table_dropped);
    assert!(report.catalog_error.is_some());
    assert!(h.keys_under(&generated_prefix()).await.is_empty());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cleanup);
    assert!(err.to_string().starts_with("cleanup incomplete: transient table:"));

    q.finish().await.unwrap();
}

#[tokio::test]
async fn report_serializes_for_logs() {
    let h = Harness::new(staged_script());
    let q = started(&h).await;

    let report = q.finish().await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["objects_deleted"], 2);
    assert_eq!(json["table_dropped"], true);
    assert!(json["storage_error"].is_null());
}
