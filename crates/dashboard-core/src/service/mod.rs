//! Contract with the orchestration service plus its HTTP implementation.

mod config;
mod http;

pub use config::ServiceConfig;
pub use http::HttpService;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServiceError;
use crate::frame::ByteStream;

/// Resume point issued by the service. Copied verbatim, never built locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    checkpoint_id: String,
    #[serde(default)]
    checkpoint_ns: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

impl Checkpoint {
    /// Reads a checkpoint out of a service response. `None` unless it carries
    /// a non-empty `checkpoint_id`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let checkpoint: Checkpoint = serde_json::from_value(value.clone()).ok()?;
        (!checkpoint.checkpoint_id.is_empty()).then_some(checkpoint)
    }

    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint_id
    }

    pub fn checkpoint_ns(&self) -> &str {
        &self.checkpoint_ns
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }
}

/// Thread snapshot returned by `fetch_state`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThreadState {
    pub values: Value,
    /// Backend names of the stages scheduled next.
    pub next: Vec<String>,
    checkpoint: Option<Value>,
    tasks: Vec<Value>,
    interrupts: Vec<Value>,
}

impl ThreadState {
    /// The checkpoint to resume from, if the service provided a usable one.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint.as_ref().and_then(Checkpoint::from_value)
    }

    /// The first pending interrupt descriptor, looking at top-level
    /// interrupts first and then at each task's interrupts.
    pub fn pending_interrupt(&self) -> Option<&Value> {
        self.interrupts.first().or_else(|| {
            self.tasks.iter().find_map(|task| {
                task.get("interrupts")
                    .and_then(Value::as_array)
                    .and_then(|interrupts| interrupts.first())
            })
        })
    }
}

/// Lifecycle status of a run on the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Error,
    Timeout,
    Interrupted,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Pending and running runs are cancelled by a stop.
    pub fn is_in_flight(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

/// A run as listed by the service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub run_id: String,
    #[serde(default)]
    pub status: RunStatus,
}

/// An opened event stream.
pub struct StreamHandle {
    /// Raw body chunks.
    pub body: ByteStream,
    /// Run id, when the service reports one.
    pub run_id: Option<String>,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// Orchestration service operations used by the session.
#[async_trait::async_trait]
pub trait OrchestrationService: Send + Sync {
    /// Creates an empty thread and returns its id.
    async fn create_thread(&self) -> Result<String, ServiceError>;

    /// Starts a run for `query` and streams its events.
    async fn open_run(&self, thread_id: &str, query: &str) -> Result<StreamHandle, ServiceError>;

    /// Fetches the thread's current state snapshot.
    async fn fetch_state(&self, thread_id: &str) -> Result<ThreadState, ServiceError>;

    /// Continues from `checkpoint`. With a payload and an interrupt id the
    /// payload answers that interrupt; without a payload the graph reruns
    /// from the checkpoint.
    async fn resume(
        &self,
        thread_id: &str,
        checkpoint: &Checkpoint,
        payload: Option<Value>,
        interrupt_id: Option<&str>,
    ) -> Result<StreamHandle, ServiceError>;

    /// Writes `values` into the thread state, optionally as if `as_node`
    /// produced them. Returns the checkpoint of the new state, if reported.
    async fn update_state(
        &self,
        thread_id: &str,
        checkpoint: &Checkpoint,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<Option<Checkpoint>, ServiceError>;

    /// Lists the thread's runs.
    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>, ServiceError>;

    /// Cancels one run.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), ServiceError>;
}
