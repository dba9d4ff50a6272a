use futures::StreamExt as _;
use reqwest::header::{CONTENT_LOCATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;

use crate::errors::{ClientError, ServiceError};
use crate::frame::ByteStream;

use super::config::ServiceConfig;
use super::{Checkpoint, OrchestrationService, Run, StreamHandle, ThreadState};

const STREAM_MODE: [&str; 1] = ["values"];

/// Orchestration service client for the LangGraph-style REST API.
pub struct HttpService {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpService {
    /// Creates a client from explicit configuration.
    pub fn new(config: ServiceConfig) -> Result<Self, ClientError> {
        if config.assistant_id.trim().is_empty() {
            return Err(ClientError::Config(
                "service config assistant_id must not be empty".into(),
            ));
        }
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| ClientError::Config(format!("invalid api key header: {e}")))?;
            headers.insert("x-api-key", value);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build service client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client using the `DASHBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ServiceConfig::from_env()?)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn open_stream(&self, thread_id: &str, body: Value) -> Result<StreamHandle, ServiceError> {
        let response = self
            .client
            .post(self.config.url(&format!("/threads/{thread_id}/runs/stream")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("stream request failed: {e}")))?;
        let response = check_status(response, "stream request").await?;
        let run_id = response
            .headers()
            .get(CONTENT_LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(run_id_from_location);
        debug!(thread_id, run_id = ?run_id, "event stream opened");

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ServiceError::transport(format!("stream read failed: {e}")))),
        );
        Ok(StreamHandle { body, run_id })
    }

    async fn get_json(&self, path: &str, what: &str) -> Result<Value, ServiceError> {
        let response = self
            .client
            .get(self.config.url(path))
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("{what} failed: {e}")))?;
        read_json(check_status(response, what).await?, what).await
    }

    async fn post_json(&self, path: &str, body: &Value, what: &str) -> Result<Value, ServiceError> {
        let response = self
            .client
            .post(self.config.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("{what} failed: {e}")))?;
        read_json(check_status(response, what).await?, what).await
    }
}

#[async_trait::async_trait]
impl OrchestrationService for HttpService {
    async fn create_thread(&self) -> Result<String, ServiceError> {
        let thread = self.post_json("/threads", &json!({}), "create thread").await?;
        thread
            .get("thread_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| ServiceError::protocol("create thread response has no thread_id"))
    }

    async fn open_run(&self, thread_id: &str, query: &str) -> Result<StreamHandle, ServiceError> {
        self.open_stream(thread_id, build_run_body(&self.config.assistant_id, query))
            .await
    }

    async fn fetch_state(&self, thread_id: &str) -> Result<ThreadState, ServiceError> {
        let state = self
            .get_json(&format!("/threads/{thread_id}/state"), "fetch state")
            .await?;
        serde_json::from_value(state)
            .map_err(|e| ServiceError::protocol(format!("invalid thread state: {e}")))
    }

    async fn resume(
        &self,
        thread_id: &str,
        checkpoint: &Checkpoint,
        payload: Option<Value>,
        interrupt_id: Option<&str>,
    ) -> Result<StreamHandle, ServiceError> {
        let body = build_resume_body(&self.config.assistant_id, checkpoint, payload, interrupt_id);
        self.open_stream(thread_id, body).await
    }

    async fn update_state(
        &self,
        thread_id: &str,
        checkpoint: &Checkpoint,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<Option<Checkpoint>, ServiceError> {
        let body = build_update_state_body(checkpoint, values, as_node);
        let response = self
            .post_json(&format!("/threads/{thread_id}/state"), &body, "update state")
            .await?;
        Ok(response.get("checkpoint").and_then(Checkpoint::from_value))
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>, ServiceError> {
        let runs = self
            .get_json(&format!("/threads/{thread_id}/runs"), "list runs")
            .await?;
        serde_json::from_value(runs)
            .map_err(|e| ServiceError::protocol(format!("invalid run list: {e}")))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.config.url(&format!("/threads/{thread_id}/runs/{run_id}/cancel")))
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("cancel run failed: {e}")))?;
        check_status(response, "cancel run").await?;
        Ok(())
    }
}

async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ServiceError::http(
        status.as_u16(),
        format!("{what} failed with status {status}: {body}"),
    ))
}

async fn read_json(response: reqwest::Response, what: &str) -> Result<Value, ServiceError> {
    response
        .json()
        .await
        .map_err(|e| ServiceError::protocol(format!("{what} returned invalid JSON: {e}")))
}

/// `/threads/{t}/runs/{run_id}` -> `run_id`.
fn run_id_from_location(location: &str) -> Option<String> {
    let (_, rest) = location.split_once("/runs/")?;
    let run_id = rest.split(['/', '?']).next()?;
    (!run_id.is_empty()).then(|| run_id.to_string())
}

pub(crate) fn build_run_body(assistant_id: &str, query: &str) -> Value {
    json!({
        "assistant_id": assistant_id,
        "input": {"query": query},
        "stream_mode": STREAM_MODE,
    })
}

pub(crate) fn build_resume_body(
    assistant_id: &str,
    checkpoint: &Checkpoint,
    payload: Option<Value>,
    interrupt_id: Option<&str>,
) -> Value {
    let mut body = json!({
        "assistant_id": assistant_id,
        "checkpoint": checkpoint,
        "stream_mode": STREAM_MODE,
    });
    match payload {
        Some(payload) => {
            let resume = match interrupt_id {
                Some(id) => {
                    let mut keyed = serde_json::Map::new();
                    keyed.insert(id.to_string(), payload);
                    Value::Object(keyed)
                }
                None => payload,
            };
            body["command"] = json!({ "resume": resume });
        }
        None => body["input"] = Value::Null,
    }
    body
}

pub(crate) fn build_update_state_body(
    checkpoint: &Checkpoint,
    values: Value,
    as_node: Option<&str>,
) -> Value {
    let mut body = json!({
        "values": values,
        "checkpoint": checkpoint,
    });
    if let Some(as_node) = as_node {
        body["as_node"] = json!(as_node);
    }
    body
}
