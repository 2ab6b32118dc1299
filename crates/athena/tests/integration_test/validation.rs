//! Rejections that happen before anything is submitted.

use std::time::Duration;

use ctas_athena::*;
use ctas_core::Config;

use crate::support::*;

#[tokio::test]
async fn non_select_never_reaches_aws() {
    // Validation runs before any client is built, so no credentials or
    // network are involved here.
    let config = Config::for_profile("");
    for sql in [
        "create table mydb.mytable as select * from flights_demo.flights_raw limit 10",
        "insert into t values (1)",
        "",
    ] {
        let err = athena_query_to_table(sql, BUCKET, SECOND, "eu-west-1", &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery, "{sql:?}");
    }
}

#[tokio::test]
async fn bucket_with_scheme_or_path_never_reaches_aws() {
    let config = Config::for_profile("");
    for bucket in ["s3://staging", "staging/results", "arn:aws:s3:::staging"] {
        let err = athena_query_to_table("select 1", bucket, SECOND, "eu-west-1", &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InaccessibleStorage, "{bucket:?}");
    }
}

#[tokio::test]
async fn zero_timeout_is_rejected_up_front() {
    let config = Config::for_profile("");
    let err = athena_query_to_table("select 1", BUCKET, Duration::ZERO, "eu-west-1", &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
}

#[tokio::test]
async fn inaccessible_bucket_fails_before_submission() {
    let h = Harness::new(Script::new().then_forever(EngineState::Succeeded));
    let request = QueryRequest::new("select 1", "blah-blah-bad-bucket", SECOND, "eu-west-1").unwrap();

    let err = run_query(request, &h.clients, &Harness::settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InaccessibleStorage);
    assert!(err.to_string().contains("blah-blah-bad-bucket"));
    assert!(h.engine.submitted_sql().is_empty());
    assert_eq!(h.engine.poll_count(), 0);
}

#[tokio::test]
async fn rejected_submission_is_transient_and_not_polled() {
    let h = Harness::new(Script::new().reject_submit("connection reset"));

    let err = h.run("select 1", SECOND).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(h.engine.poll_count(), 0);
    assert!(h.catalog.is_empty());
}
