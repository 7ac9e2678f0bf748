//! BigQuery executor against a local stand-in for the REST API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use medallion_engine::auth::GcpAuth;
use medallion_engine::warehouse::{BigQueryConfig, BigQueryExecutor};
use medallion_engine::{ErrorKind, ExecutionStats, QueryExecutor};

/// Canned responses for `jobs.query`, `getQueryResults` and `jobs.get`.
#[derive(Default)]
struct FakeBigQuery {
    submit: Mutex<Value>,
    polls: Mutex<VecDeque<Value>>,
    job: Mutex<Option<Value>>,
    submitted: Mutex<Vec<Value>>,
    poll_calls: AtomicUsize,
    job_calls: AtomicUsize,
}

impl FakeBigQuery {
    fn new(submit: Value) -> Self {
        Self {
            submit: Mutex::new(submit),
            ..Default::default()
        }
    }

    fn with_polls(self, polls: Vec<Value>) -> Self {
        *self.polls.lock().unwrap() = polls.into();
        self
    }

    fn with_job(self, job: Value) -> Self {
        *self.job.lock().unwrap() = Some(job);
        self
    }
}

async fn submit(
    State(fake): State<Arc<FakeBigQuery>>,
    Path(_project): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    fake.submitted.lock().unwrap().push(body);
    Json(fake.submit.lock().unwrap().clone())
}

async fn poll(
    State(fake): State<Arc<FakeBigQuery>>,
    Path((_project, _job_id)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    fake.poll_calls.fetch_add(1, Ordering::SeqCst);
    fake.polls
        .lock()
        .unwrap()
        .pop_front()
        .map(Json)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn job(
    State(fake): State<Arc<FakeBigQuery>>,
    Path((_project, _job_id)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    fake.job_calls.fetch_add(1, Ordering::SeqCst);
    fake.job
        .lock()
        .unwrap()
        .clone()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn serve(fake: Arc<FakeBigQuery>) -> String {
    let app = Router::new()
        .route("/projects/{project}/queries", post(submit))
        .route("/projects/{project}/queries/{job_id}", get(poll))
        .route("/projects/{project}/jobs/{job_id}", get(job))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn executor(api_base: String, job_deadline_secs: u64) -> BigQueryExecutor {
    let mut config = BigQueryConfig::new("proj").with_location(Some("US".to_string()));
    config.api_base = api_base;
    config.job_deadline_secs = job_deadline_secs;
    config.poll_timeout_ms = 100;
    BigQueryExecutor::new(config, GcpAuth::with_static_token("test-token")).unwrap()
}

fn job_ref() -> Value {
    json!({ "projectId": "proj", "jobId": "job_1", "location": "US" })
}

#[tokio::test]
async fn polls_until_complete_then_reads_billing_from_job() {
    let fake = Arc::new(
        FakeBigQuery::new(json!({ "jobComplete": false, "jobReference": job_ref() }))
            .with_polls(vec![
                json!({ "jobComplete": false, "jobReference": job_ref() }),
                json!({ "jobComplete": true, "jobReference": job_ref(), "totalBytesProcessed": "2048" }),
            ])
            .with_job(json!({
                "statistics": {
                    "totalBytesProcessed": "2048",
                    "query": { "totalBytesBilled": "10485760" }
                },
                "status": { "state": "DONE" }
            })),
    );
    let bq = executor(serve(fake.clone()).await, 3600);

    let stats = bq
        .execute_sql("CREATE OR REPLACE TABLE `proj.silver.orders` AS SELECT 1")
        .await
        .unwrap();

    assert_eq!(
        stats,
        ExecutionStats {
            bytes_processed: 2048,
            bytes_billed: 10_485_760,
        }
    );
    assert_eq!(fake.poll_calls.load(Ordering::SeqCst), 2);
    assert_eq!(fake.job_calls.load(Ordering::SeqCst), 1);

    let submitted = fake.submitted.lock().unwrap();
    assert_eq!(submitted[0]["useLegacySql"], false);
    assert_eq!(submitted[0]["location"], "US");
}

#[tokio::test]
async fn job_past_deadline_is_timeout() {
    let fake = Arc::new(FakeBigQuery::new(
        json!({ "jobComplete": false, "jobReference": job_ref() }),
    ));
    let bq = executor(serve(fake.clone()).await, 0);

    let err = bq.execute_sql("SELECT 1").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(fake.poll_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn incomplete_job_without_reference_fails() {
    let fake = Arc::new(FakeBigQuery::new(json!({ "jobComplete": false })));
    let bq = executor(serve(fake.clone()).await, 3600);

    let err = bq.execute_sql("SELECT 1").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unknown);
    assert!(err.message.contains("job reference"));
}

#[tokio::test]
async fn warnings_on_completed_job_do_not_fail_the_step() {
    let fake = Arc::new(
        FakeBigQuery::new(json!({
            "jobComplete": true,
            "jobReference": job_ref(),
            "totalBytesProcessed": "512",
            "totalBytesBilled": "10485760",
            "errors": [{ "reason": "invalid", "message": "Field description is deprecated" }]
        }))
        .with_job(json!({ "status": { "state": "DONE" } })),
    );
    let bq = executor(serve(fake.clone()).await, 3600);

    let stats = bq.execute_sql("SELECT 1").await.unwrap();

    assert_eq!(stats.bytes_processed, 512);
    assert_eq!(stats.bytes_billed, 10_485_760);
    assert_eq!(fake.job_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn error_result_on_completed_job_fails_the_step() {
    let fake = Arc::new(
        FakeBigQuery::new(json!({
            "jobComplete": true,
            "jobReference": job_ref(),
            "errors": [{ "reason": "accessDenied", "message": "Access Denied: Table proj:bronze.orders" }]
        }))
        .with_job(json!({
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "accessDenied", "message": "Access Denied: Table proj:bronze.orders" }
            }
        })),
    );
    let bq = executor(serve(fake).await, 3600);

    let err = bq.execute_sql("SELECT 1").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::PermissionDenied);
    assert_eq!(err.message, "Access Denied: Table proj:bronze.orders");
}

#[tokio::test]
async fn count_and_rows_read_the_result_set() {
    let fake = Arc::new(FakeBigQuery::new(json!({
        "jobComplete": true,
        "jobReference": job_ref(),
        "totalBytesBilled": "0",
        "schema": { "fields": [{ "name": "row_count" }] },
        "rows": [{ "f": [{ "v": "1095" }] }]
    })));
    let bq = executor(serve(fake.clone()).await, 3600);

    assert_eq!(bq.count_rows("proj.gold.dim_date").await.unwrap(), 1095);

    let rows = bq.fetch_rows("SELECT 1").await.unwrap();
    assert_eq!(rows.columns, vec!["row_count"]);
    assert_eq!(rows.rows[0][0], "1095");

    let submitted = fake.submitted.lock().unwrap();
    assert_eq!(
        submitted[0]["query"],
        "SELECT COUNT(*) AS row_count FROM `proj.gold.dim_date`"
    );
    assert_eq!(fake.job_calls.load(Ordering::SeqCst), 0);
}
