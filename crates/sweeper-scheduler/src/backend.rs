use async_trait::async_trait;
use serde::Deserialize;
use sweeper_core::config::Neo4jConfig;
use thiserror::Error;
use tracing::{debug, warn};

/// JSON pointer to the per-call row count inside a backend result.
pub const ROW_COUNT_POINTER: &str = "/results/0/data/0/row/0";

/// Errors reported by the query engine itself or the transport to it.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, transport timeout.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other transport failure while sending the request.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx status from the endpoint (bad credentials, wrong database path).
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The engine accepted the request but rejected the query.
    #[error("query failed ({code}): {message}")]
    Query { code: String, message: String },

    /// The response body was not the transactional result document.
    #[error("unreadable backend response: {0}")]
    Parse(String),
}

/// A result document that does not carry a single integer row count.
#[derive(Debug, Error)]
#[error("no integer row count at /results/0/data/0/row/0: {reason}")]
pub struct ResultShapeError {
    pub reason: String,
}

/// Opaque query capability: run a query, get its structured result back.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, query: &str) -> Result<serde_json::Value, BackendError>;
}

/// Read the row count a drain-style query reports for one invocation.
pub fn extract_row_count(result: &serde_json::Value) -> Result<i64, ResultShapeError> {
    let value = result.pointer(ROW_COUNT_POINTER).ok_or_else(|| ResultShapeError {
        reason: "path missing".to_string(),
    })?;
    value.as_i64().ok_or_else(|| ResultShapeError {
        reason: format!("expected integer, found {value}"),
    })
}

/// Neo4j transactional HTTP endpoint (`/db/<name>/tx/commit`).
pub struct Neo4jHttpBackend {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, Option<String>)>,
}

impl Neo4jHttpBackend {
    pub fn new(config: &Neo4jConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        }
    }
}

#[async_trait]
impl QueryBackend for Neo4jHttpBackend {
    fn name(&self) -> &str {
        "neo4j"
    }

    async fn execute(&self, query: &str) -> Result<serde_json::Value, BackendError> {
        let body = build_request_body(query);
        debug!(endpoint = %self.endpoint, "sending statement to Neo4j");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(&body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                BackendError::Unavailable(e.to_string())
            } else {
                BackendError::Http(e)
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Neo4j API error");
            return Err(BackendError::Api {
                status,
                message: text,
            });
        }

        let document: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;
        check_errors(&document)?;
        Ok(document)
    }
}

fn build_request_body(query: &str) -> serde_json::Value {
    serde_json::json!({
        "statements": [
            { "statement": query }
        ]
    })
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Neo4j reports statement failures in a top-level `errors` array with a 200.
fn check_errors(document: &serde_json::Value) -> Result<(), BackendError> {
    let Some(errors) = document.get("errors") else {
        return Ok(());
    };
    let errors: Vec<StatementError> = serde_json::from_value(errors.clone())
        .map_err(|e| BackendError::Parse(format!("errors field: {e}")))?;
    match errors.into_iter().next() {
        None => Ok(()),
        Some(first) => Err(BackendError::Query {
            code: first.code,
            message: first.message,
        }),
    }
}
