//! BigQuery query executor.
//!
//! Submits statements through the BigQuery REST API (`jobs.query`) and
//! polls `jobs.getQueryResults` until the job completes.
//!
//! A non-2xx response fails the query. For a completed job, `errors` in the
//! query response may hold warnings, so the outcome comes from the job's
//! `status.errorResult` (`jobs.get`) and `errors` only adds detail.
//! See: https://cloud.google.com/bigquery/docs/reference/rest/v2/jobs/query

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::GcpAuth;
use crate::error::EngineError;
use crate::executor::{ExecutionStats, QueryError, QueryExecutor, QueryRows};
use crate::result::ErrorKind;

/// BigQuery executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Project that owns (and pays for) the jobs.
    pub project_id: String,

    /// Dataset location (e.g. "US", "southamerica-east1").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// How long each API call waits server-side for the job to finish.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Give up on a job after this many seconds.
    #[serde(default = "default_job_deadline_secs")]
    pub job_deadline_secs: u64,

    /// API root, overridable for emulators.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_poll_timeout_ms() -> u64 {
    10_000
}

fn default_job_deadline_secs() -> u64 {
    // BigQuery's own limit for a single query job.
    6 * 60 * 60
}

fn default_api_base() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

impl BigQueryConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: None,
            poll_timeout_ms: default_poll_timeout_ms(),
            job_deadline_secs: default_job_deadline_secs(),
            api_base: default_api_base(),
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<Row>,
    total_bytes_processed: Option<String>,
    total_bytes_billed: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

/// `jobs.get` response: final status, plus billing statistics that
/// `getQueryResults` does not return.
#[derive(Debug, Deserialize)]
struct Job {
    statistics: Option<JobStatistics>,
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    total_bytes_processed: Option<String>,
    query: Option<QueryStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatistics {
    total_bytes_billed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

/// Executes SQL against BigQuery.
pub struct BigQueryExecutor {
    http_client: Client,
    auth: GcpAuth,
    config: BigQueryConfig,
}

impl BigQueryExecutor {
    pub fn new(config: BigQueryConfig, auth: GcpAuth) -> Result<Self, EngineError> {
        if config.project_id.trim().is_empty() {
            return Err(EngineError::Configuration(
                "BigQuery project id is empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.poll_timeout_ms) + Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            auth,
            config,
        })
    }

    /// Submit a query and wait for it to finish.
    async fn run_query(&self, sql: &str) -> Result<QueryResponse, QueryError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.job_deadline_secs);
        let token = self.token().await?;

        let url = format!("{}/projects/{}/queries", self.config.api_base, self.config.project_id);
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.config.poll_timeout_ms,
            location: self.config.location.as_deref(),
        };

        tracing::debug!(project = %self.config.project_id, "Submitting BigQuery job");

        let request = self.http_client.post(&url).bearer_auth(&token).json(&body);
        let mut response: QueryResponse = self.send(request).await?;

        while !response.job_complete {
            if Instant::now() >= deadline {
                return Err(QueryError::new(
                    ErrorKind::Timeout,
                    format!(
                        "Job did not complete within {} seconds",
                        self.config.job_deadline_secs
                    ),
                ));
            }

            let job = response.job_reference.clone().ok_or_else(|| {
                QueryError::new(ErrorKind::Unknown, "Incomplete job without a job reference")
            })?;

            tracing::debug!(job_id = %job.job_id, "Waiting for BigQuery job");

            let url = self.job_url(&job, "queries");
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(&token)
                .query(&[("timeoutMs", self.config.poll_timeout_ms.to_string())]);
            if let Some(location) = job.location.as_deref().or(self.config.location.as_deref()) {
                request = request.query(&[("location", location)]);
            }

            let next: QueryResponse = self.send(request).await?;
            response = QueryResponse {
                job_reference: next.job_reference.or(Some(job)),
                ..next
            };
        }

        if response.total_bytes_billed.is_none() || !response.errors.is_empty() {
            if let Some(job) = response.job_reference.clone() {
                if let Some(failure) = self.inspect_job(&token, &job, &mut response).await {
                    return Err(job_error(&failure, &response.errors));
                }
            }
        }

        for entry in &response.errors {
            tracing::warn!(
                reason = entry.reason.as_deref().unwrap_or(""),
                message = entry.message.as_deref().unwrap_or(""),
                "BigQuery reported an error entry for a successful job"
            );
        }

        Ok(response)
    }

    /// Look up the finished job via `jobs.get`.
    ///
    /// Fills billing statistics and returns the job's `errorResult`, if any.
    /// A failed lookup is logged and treated as success, since the query
    /// calls themselves returned 2xx.
    async fn inspect_job(
        &self,
        token: &str,
        job: &JobReference,
        response: &mut QueryResponse,
    ) -> Option<ErrorProto> {
        let url = self.job_url(job, "jobs");
        let mut request = self.http_client.get(&url).bearer_auth(token);
        if let Some(location) = job.location.as_deref().or(self.config.location.as_deref()) {
            request = request.query(&[("location", location)]);
        }

        match self.send::<Job>(request).await {
            Ok(found) => {
                if let Some(stats) = found.statistics {
                    if response.total_bytes_processed.is_none() {
                        response.total_bytes_processed = stats.total_bytes_processed;
                    }
                    if let Some(billed) = stats.query.and_then(|q| q.total_bytes_billed) {
                        response.total_bytes_billed = Some(billed);
                    }
                }
                found.status.and_then(|s| s.error_result)
            }
            Err(e) => {
                tracing::debug!(job_id = %job.job_id, error = %e, "Could not fetch job status");
                None
            }
        }
    }

    fn job_url(&self, job: &JobReference, collection: &str) -> String {
        format!(
            "{}/projects/{}/{}/{}",
            self.config.api_base, self.config.project_id, collection, job.job_id
        )
    }

    async fn token(&self) -> Result<String, QueryError> {
        self.auth
            .token()
            .await
            .map_err(|e| QueryError::new(ErrorKind::PermissionDenied, e.to_string()))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, QueryError> {
        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                ErrorKind::Timeout
            } else {
                ErrorKind::Unknown
            };
            QueryError::new(kind, format!("BigQuery request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status, &text));
        }

        response.json().await.map_err(|e| {
            QueryError::new(
                ErrorKind::Unknown,
                format!("Failed to parse BigQuery response: {}", e),
            )
        })
    }
}

#[async_trait]
impl QueryExecutor for BigQueryExecutor {
    async fn execute_sql(&self, sql: &str) -> Result<ExecutionStats, QueryError> {
        let response = self.run_query(sql).await?;
        Ok(stats_from(&response))
    }

    async fn count_rows(&self, table: &str) -> Result<i64, QueryError> {
        let sql = count_query(table);
        let response = self.run_query(&sql).await?;
        first_cell_as_i64(&response).ok_or_else(|| {
            QueryError::new(
                ErrorKind::Unknown,
                format!("Row count query for {} returned no rows", table),
            )
        })
    }

    async fn fetch_rows(&self, sql: &str) -> Result<QueryRows, QueryError> {
        let response = self.run_query(sql).await?;
        Ok(rows_from(&response))
    }
}

impl std::fmt::Debug for BigQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `SELECT COUNT(*)` for a fully qualified table.
pub fn count_query(table: &str) -> String {
    format!("SELECT COUNT(*) AS row_count FROM `{}`", table.trim_matches('`'))
}

fn stats_from(response: &QueryResponse) -> ExecutionStats {
    ExecutionStats {
        bytes_processed: parse_int64(response.total_bytes_processed.as_deref()),
        bytes_billed: parse_int64(response.total_bytes_billed.as_deref()),
    }
}

/// BigQuery encodes int64 as JSON strings; absent means zero (DDL).
fn parse_int64(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn first_cell_as_i64(response: &QueryResponse) -> Option<i64> {
    let cell = response.rows.first()?.f.first()?;
    match &cell.v {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Only the first page; sample queries carry a `LIMIT`.
fn rows_from(response: &QueryResponse) -> QueryRows {
    QueryRows {
        columns: response
            .schema
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default(),
        rows: response
            .rows
            .iter()
            .map(|row| row.f.iter().map(|cell| cell.v.clone()).collect())
            .collect(),
    }
}

/// Error for a job whose final status carries an `errorResult`. Other
/// messages from `errors` are appended as detail.
fn job_error(failure: &ErrorProto, details: &[ErrorProto]) -> QueryError {
    let mut message = failure
        .message
        .clone()
        .unwrap_or_else(|| "Job failed".to_string());
    for detail in details.iter().filter_map(|d| d.message.as_deref()) {
        if !message.contains(detail) {
            message.push_str("; ");
            message.push_str(detail);
        }
    }
    QueryError::new(classify(None, failure.reason.as_deref()), message)
}

fn api_error(status: StatusCode, body: &str) -> QueryError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let reason = parsed.error.errors.first().and_then(|e| e.reason.clone());
            let message = parsed
                .error
                .message
                .or_else(|| parsed.error.errors.first().and_then(|e| e.message.clone()))
                .unwrap_or_else(|| status.to_string());
            QueryError::new(classify(Some(status), reason.as_deref()), message)
        }
        Err(_) => QueryError::new(
            classify(Some(status), None),
            format!("BigQuery returned {}: {}", status, body),
        ),
    }
}

/// Map a BigQuery error reason (preferred) or HTTP status to an error kind.
fn classify(status: Option<StatusCode>, reason: Option<&str>) -> ErrorKind {
    match reason {
        Some("invalidQuery") | Some("invalid") => return ErrorKind::SyntaxError,
        Some("accessDenied") | Some("billingNotEnabled") => return ErrorKind::PermissionDenied,
        Some("notFound") => return ErrorKind::NotFound,
        Some("quotaExceeded") | Some("rateLimitExceeded") | Some("resourcesExceeded") => {
            return ErrorKind::QuotaExceeded
        }
        Some("timeout") | Some("jobBackendError") => return ErrorKind::Timeout,
        _ => {}
    }

    match status {
        Some(StatusCode::BAD_REQUEST) => ErrorKind::SyntaxError,
        Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => {
            ErrorKind::PermissionDenied
        }
        Some(StatusCode::NOT_FOUND) => ErrorKind::NotFound,
        Some(StatusCode::TOO_MANY_REQUESTS) => ErrorKind::QuotaExceeded,
        Some(StatusCode::REQUEST_TIMEOUT) | Some(StatusCode::GATEWAY_TIMEOUT) => {
            ErrorKind::Timeout
        }
        _ => ErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let json = serde_json::json!({ "project_id": "sixth-foundry" });
        let config: BigQueryConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.poll_timeout_ms, 10_000);
        assert_eq!(config.job_deadline_secs, 21_600);
        assert_eq!(config.api_base, "https://bigquery.googleapis.com/bigquery/v2");
        assert!(config.location.is_none());
    }

    #[test]
    fn test_executor_rejects_empty_project() {
        let result = BigQueryExecutor::new(BigQueryConfig::new("  "), GcpAuth::with_static_token("t"));
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_count_query() {
        assert_eq!(
            count_query("p.silver.orders"),
            "SELECT COUNT(*) AS row_count FROM `p.silver.orders`"
        );
        assert_eq!(
            count_query("`p.silver.orders`"),
            "SELECT COUNT(*) AS row_count FROM `p.silver.orders`"
        );
    }

    #[test]
    fn test_request_serialization() {
        let body = QueryRequest {
            query: "SELECT 1",
            use_legacy_sql: false,
            timeout_ms: 10_000,
            location: Some("US"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["useLegacySql"], false);
        assert_eq!(json["timeoutMs"], 10_000);
        assert_eq!(json["location"], "US");
    }

    #[test]
    fn test_stats_from_response() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "jobComplete": true,
            "totalBytesProcessed": "1048576",
            "totalBytesBilled": "10485760"
        }))
        .unwrap();
        let stats = stats_from(&response);
        assert_eq!(stats.bytes_processed, 1_048_576);
        assert_eq!(stats.bytes_billed, 10_485_760);
    }

    #[test]
    fn test_stats_default_to_zero_for_ddl() {
        let response: QueryResponse =
            serde_json::from_value(serde_json::json!({ "jobComplete": true })).unwrap();
        assert_eq!(stats_from(&response), ExecutionStats::default());
    }

    #[test]
    fn test_first_cell_count() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "jobComplete": true,
            "rows": [{ "f": [{ "v": "42" }] }]
        }))
        .unwrap();
        assert_eq!(first_cell_as_i64(&response), Some(42));

        let empty = QueryResponse::default();
        assert_eq!(first_cell_as_i64(&empty), None);
    }

    #[test]
    fn test_api_error_uses_reason() {
        let body = r#"{"error":{"code":404,"message":"Not found: Table p:silver.products","errors":[{"reason":"notFound","message":"Not found: Table p:silver.products"}]}}"#;
        let err = api_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Not found: Table p:silver.products");

        let body = r#"{"error":{"code":400,"message":"Syntax error","errors":[{"reason":"invalidQuery"}]}}"#;
        assert_eq!(api_error(StatusCode::BAD_REQUEST, body).kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_api_error_unparseable_body_falls_back_to_status() {
        let err = api_error(StatusCode::FORBIDDEN, "<html>denied</html>");
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert!(err.message.contains("denied"));

        assert_eq!(
            api_error(StatusCode::TOO_MANY_REQUESTS, "").kind,
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "").kind,
            ErrorKind::Unknown
        );
    }

    fn proto(reason: &str, message: &str) -> ErrorProto {
        ErrorProto {
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn test_job_error_uses_error_result_reason() {
        let failure = proto("quotaExceeded", "Quota exceeded");
        let details = vec![
            proto("quotaExceeded", "Quota exceeded"),
            proto("invalid", "Exceeded rate limits for table updates"),
        ];
        let err = job_error(&failure, &details);
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(
            err.message,
            "Quota exceeded; Exceeded rate limits for table updates"
        );
    }

    #[test]
    fn test_rows_from_response() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "jobComplete": true,
            "schema": { "fields": [{ "name": "order_date" }, { "name": "total_orders" }] },
            "rows": [
                { "f": [{ "v": "2026-01-15" }, { "v": "12" }] },
                { "f": [{ "v": null }, { "v": "0" }] }
            ]
        }))
        .unwrap();

        let rows = rows_from(&response);
        assert_eq!(rows.columns, vec!["order_date", "total_orders"]);
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0][0], "2026-01-15");
        assert!(rows.rows[1][0].is_null());
    }

    #[test]
    fn test_classify_reason_beats_status() {
        assert_eq!(
            classify(Some(StatusCode::BAD_REQUEST), Some("accessDenied")),
            ErrorKind::PermissionDenied
        );
        assert_eq!(classify(None, Some("jobBackendError")), ErrorKind::Timeout);
        assert_eq!(classify(None, Some("somethingNew")), ErrorKind::Unknown);
    }
}
