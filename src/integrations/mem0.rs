//! Client for the hosted long-term-memory service (Mem0-style REST API).

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

const MEM0_API_URL: &str = "https://api.mem0.ai";

/// One conversational message handed to the memory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A stored or retrieved memory. The service's payloads are loosely typed;
/// every field is read through an explicit default.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub memory: String,
    pub score: Option<f32>,
}

/// Memory service client.
#[derive(Debug, Clone)]
pub struct Mem0Client {
    http: Client,
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    project_id: Option<String>,
}

impl Mem0Client {
    /// Create client from the MEM0_API_KEY environment variable.
    pub fn from_env(org_id: Option<String>, project_id: Option<String>) -> Result<Self> {
        let api_key = env::var("MEM0_API_KEY")
            .map_err(|_| Error::Config("MEM0_API_KEY not set".to_string()))?;
        Self::new(api_key, org_id, project_id)
    }

    /// Create client with an explicit API key.
    pub fn new<S: Into<String>>(
        api_key: S,
        org_id: Option<String>,
        project_id: Option<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("MEM0_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("hr_rag_agent/0.1.0")
            .build()
            .map_err(|e| Error::Memory(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: MEM0_API_URL.to_string(),
            org_id,
            project_id,
        })
    }

    /// Point the client at a different host (tests, self-hosted service).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Store new memories extracted from the given messages.
    pub async fn add(&self, messages: &[MemoryMessage], user_id: &str) -> Result<Vec<MemoryRecord>> {
        let mut body = json!({
            "messages": messages,
            "user_id": user_id,
        });
        self.attach_scope(&mut body);

        let value = self.post("/v1/memories/", &body).await?;
        let records = parse_records(&value);
        debug!("Stored {} memories for {}", records.len(), user_id);
        Ok(records)
    }

    /// Search memories relevant to a query.
    pub async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryRecord>> {
        let mut body = json!({
            "query": query,
            "user_id": user_id,
        });
        self.attach_scope(&mut body);

        let value = self.post("/v1/memories/search/", &body).await?;
        let records = parse_records(&value);
        debug!("Found {} memories for {}", records.len(), user_id);
        Ok(records)
    }

    fn attach_scope(&self, body: &mut Value) {
        if let Some(org_id) = &self.org_id {
            body["org_id"] = json!(org_id);
        }
        if let Some(project_id) = &self.project_id {
            body["project_id"] = json!(project_id);
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Memory(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Memory(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Memory(format!("Mem0 error {}: {}", status, text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Memory(format!("invalid response: {}", e)))
    }
}

/// The service answers either with a bare list or `{"results": [...]}`,
/// and item fields vary by event type — read them defensively.
fn parse_records(value: &Value) -> Vec<MemoryRecord> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("results")
            .and_then(Value::as_array)
            .map(|a| a.as_slice())
            .unwrap_or_default(),
        _ => &[],
    };

    items
        .iter()
        .map(|item| MemoryRecord {
            id: item
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            memory: item
                .get("memory")
                .or_else(|| item.get("data"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score: item
                .get("score")
                .and_then(Value::as_f64)
                .map(|s| s as f32),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> Mem0Client {
        Mem0Client::new("test_key", None, None)
            .unwrap()
            .with_base_url(server.base_url())
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(Mem0Client::new("   ", None, None).is_err());
    }

    #[tokio::test]
    async fn add_sends_token_auth_and_parses_results() {
        let server = MockServer::start_async().await;

        let add_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/memories/")
                .header("Authorization", "Token test_key");
            then.status(200).json_body(serde_json::json!({
                "results": [
                    { "id": "mem-1", "memory": "Enjoys hiking", "event": "ADD" }
                ]
            }));
        });

        let records = client(&server)
            .add(&[MemoryMessage::user("I love hiking")], "user_1")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "mem-1");
        assert_eq!(records[0].memory, "Enjoys hiking");
        add_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn search_parses_bare_list_responses() {
        let server = MockServer::start_async().await;

        let search_mock = server.mock(|when, then| {
            when.method(POST).path("/v1/memories/search/");
            then.status(200).json_body(serde_json::json!([
                { "id": "mem-2", "memory": "Learning Spanish", "score": 0.87 }
            ]));
        });

        let records = client(&server)
            .search("hobbies", "user_1")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!((records[0].score.unwrap() - 0.87).abs() < 1e-6);
        search_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn http_failure_surfaces_status_and_body() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/v1/memories/");
            then.status(401).body("invalid token");
        });

        let err = client(&server)
            .add(&[MemoryMessage::user("hi")], "user_1")
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid token"));
    }

    #[tokio::test]
    async fn org_and_project_travel_in_the_body() {
        let server = MockServer::start_async().await;

        let scoped_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/memories/search/")
                .json_body_includes(r#"{"org_id": "org-1", "project_id": "proj-1"}"#);
            then.status(200).json_body(serde_json::json!([]));
        });

        let scoped = Mem0Client::new("test_key", Some("org-1".into()), Some("proj-1".into()))
            .unwrap()
            .with_base_url(server.base_url());

        let records = scoped.search("anything", "user_1").await.unwrap();
        assert!(records.is_empty());
        scoped_mock.assert_calls(1);
    }

    #[test]
    fn parse_records_defaults_missing_fields() {
        let value = serde_json::json!({ "results": [ {} ] });
        let records = parse_records(&value);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "");
        assert_eq!(records[0].memory, "");
        assert!(records[0].score.is_none());
    }

    #[test]
    fn parse_records_ignores_non_list_payloads() {
        assert!(parse_records(&serde_json::json!("oops")).is_empty());
        assert!(parse_records(&serde_json::json!({ "detail": "error" })).is_empty());
    }
}
