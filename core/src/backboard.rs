//! The thin GraphQL client layer for the hosted log-search API (spec §6).
//! Treated as an external collaborator by the spec; it exists here only so
//! C6 has something real to call.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const LOG_SEARCH_QUERY: &str = r#"
query SearchLogs($deploymentId: String, $environmentId: String, $filter: String!, $limit: Int!) {
  logs(deploymentId: $deploymentId, environmentId: $environmentId, filter: $filter, limit: $limit) {
    attributes { key value }
    timestamp
    severity
    message
  }
}
"#;

#[derive(Debug, Deserialize)]
pub struct LogAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct LogEntry {
    pub attributes: Vec<LogAttribute>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogsPayload {
    logs: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<LogsPayload>,
    #[serde(default)]
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

/// The capability C6 needs from the log-search layer. Split out as a trait
/// (rather than calling `BackboardClient` directly) so tests can substitute
/// an in-memory double instead of standing up a GraphQL endpoint.
#[async_trait::async_trait]
pub trait LogSearchBackend: Send + Sync {
    async fn search_logs(
        &self,
        deployment_id: Option<&str>,
        environment_id: Option<&str>,
        filter: &str,
        limit: usize,
        deadline: Duration,
    ) -> Result<Vec<LogEntry>>;
}

pub struct BackboardClient {
    http: reqwest::Client,
    url: String,
}

impl BackboardClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait::async_trait]
impl LogSearchBackend for BackboardClient {
    /// Runs the platform's log-search operation with a per-request deadline
    /// (spec §5 "cancellation and timeouts").
    async fn search_logs(
        &self,
        deployment_id: Option<&str>,
        environment_id: Option<&str>,
        filter: &str,
        limit: usize,
        deadline: Duration,
    ) -> Result<Vec<LogEntry>> {
        let body = GraphQLRequest {
            query: LOG_SEARCH_QUERY,
            variables: json!({
                "deploymentId": deployment_id,
                "environmentId": environment_id,
                "filter": filter,
                "limit": limit,
            }),
        };

        let response = tokio::time::timeout(deadline, self.http.post(&self.url).json(&body).send())
            .await
            .map_err(|_| StorageError::Timeout)?
            .map_err(|e| StorageError::SearchBackendError(e.to_string()))?;

        let parsed: GraphQLResponse = tokio::time::timeout(deadline, response.json())
            .await
            .map_err(|_| StorageError::Timeout)?
            .map_err(|e| StorageError::SearchBackendError(e.to_string()))?;

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            return Err(StorageError::SearchBackendError(format!("{errors:?}")).into());
        }

        parsed
            .data
            .map(|d| d.logs)
            .ok_or_else(|| StorageError::SearchBackendError("missing data.logs in response".to_string()).into())
    }
}

/// An in-memory stand-in for the backboard, used by the record façade's own
/// tests and by `core/tests/` integration tests. Holds every log line ever
/// appended and answers a filter the same way the real log-search index
/// would for the small filter grammar in spec §4.6 (a conjunction of
/// `@key:"value"` / `-@key:"value"` clauses).
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockBackboard {
        entries: Mutex<Vec<LogEntry>>,
    }

    impl MockBackboard {
        pub fn push(&self, entry: LogEntry) {
            self.entries.lock().expect("mock backboard mutex poisoned").push(entry);
        }
    }

    #[async_trait::async_trait]
    impl LogSearchBackend for MockBackboard {
        async fn search_logs(
            &self,
            _deployment_id: Option<&str>,
            _environment_id: Option<&str>,
            filter: &str,
            limit: usize,
            _deadline: Duration,
        ) -> Result<Vec<LogEntry>> {
            let clauses = parse_clauses(filter);
            let entries = self.entries.lock().expect("mock backboard mutex poisoned");
            Ok(entries
                .iter()
                .filter(|entry| clauses.iter().all(|c| c.matches(entry)))
                .take(limit)
                .map(clone_entry)
                .collect())
        }
    }

    struct Clause {
        key: String,
        value: String,
        negated: bool,
    }

    impl Clause {
        fn matches(&self, entry: &LogEntry) -> bool {
            let present = entry.attributes.iter().any(|attr| {
                attr.key == self.key
                    && serde_json::from_str::<serde_json::Value>(&attr.value)
                        .ok()
                        .map(|v| match v {
                            serde_json::Value::String(s) => s == self.value,
                            other => other.to_string() == self.value,
                        })
                        .unwrap_or(false)
            });
            present != self.negated
        }
    }

    fn parse_clauses(filter: &str) -> Vec<Clause> {
        filter
            .split(" AND ")
            .filter_map(|raw| {
                let raw = raw.trim();
                if raw.is_empty() {
                    return None;
                }
                let (negated, raw) = match raw.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                let raw = raw.strip_prefix('@')?;
                let (key, rest) = raw.split_once(':')?;
                let value = rest.trim_matches('"');
                Some(Clause { key: key.to_string(), value: value.to_string(), negated })
            })
            .collect()
    }

    fn clone_entry(entry: &LogEntry) -> LogEntry {
        LogEntry {
            attributes: entry
                .attributes
                .iter()
                .map(|a| LogAttribute { key: a.key.clone(), value: a.value.clone() })
                .collect(),
            timestamp: entry.timestamp,
            severity: entry.severity.clone(),
            message: entry.message.clone(),
        }
    }
}
