//! The session drives one thread through the pipeline: it owns the workflow
//! state, the single active stream, progress, the pending interrupt and the
//! message log. It is the only place any of them change.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::decision::{Decision, build_resume_payload};
use crate::errors::ClientError;
use crate::event::StreamEvent;
use crate::interrupt::{Interrupt, InterruptKind, detect};
use crate::log::{LogEntry, MessageLog};
use crate::pipeline::{ArtifactShape, PipelineConfig, PipelineNode};
use crate::service::{Checkpoint, OrchestrationService, StreamHandle};
use crate::stream::{AbortHandle, ActiveStream};
use crate::tracker::{PipelineProgress, StatusTracker, invalidate_downstream};

/// Stage reported when the service has nothing scheduled next.
const DEFAULT_RESUME_NODE: &str = "data_collector";

/// Lifecycle of the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Idle,
    Running,
    Interrupted,
    Stopped,
    Complete,
    Error,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Running => "running",
            WorkflowState::Interrupted => "interrupted",
            WorkflowState::Stopped => "stopped",
            WorkflowState::Complete => "complete",
            WorkflowState::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one call to [`Session::next_update`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// An event was applied.
    Event { state: WorkflowState },
    /// The event paused the pipeline; the stream has been retired.
    Interrupted(InterruptKind),
    /// The stream ended or was cancelled.
    Finished { state: WorkflowState },
    /// Reading the stream failed; the session is in `Error`.
    Failed { message: String },
}

/// Owned copy of everything a UI renders.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionSnapshot {
    pub session_id: uuid::Uuid,
    pub thread_id: Option<String>,
    pub state: WorkflowState,
    pub statuses: crate::tracker::NodeStatusSet,
    pub artifacts: crate::tracker::ArtifactStore,
    pub interrupt: Option<Interrupt>,
    pub log: Vec<LogEntry>,
}

/// Client-side session for one pipeline thread.
pub struct Session {
    id: uuid::Uuid,
    service: Arc<dyn OrchestrationService>,
    tracker: StatusTracker,
    thread_id: Option<String>,
    state: WorkflowState,
    progress: PipelineProgress,
    interrupt: Option<Interrupt>,
    /// A decision was sent for `interrupt`; it is dropped with the next event.
    interrupt_superseded: bool,
    log: MessageLog,
    active: Option<ActiveStream>,
}

impl Session {
    pub fn new(service: Arc<dyn OrchestrationService>, pipeline: Arc<PipelineConfig>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            service,
            tracker: StatusTracker::new(pipeline),
            thread_id: None,
            state: WorkflowState::Idle,
            progress: PipelineProgress::default(),
            interrupt: None,
            interrupt_superseded: false,
            log: MessageLog::default(),
            active: None,
        }
    }

    /// Rebuilds a session for an existing thread from its state snapshot.
    ///
    /// The state values are applied as a single event. A pause recorded in the
    /// snapshot is restored as the pending interrupt.
    pub async fn attach(
        service: Arc<dyn OrchestrationService>,
        pipeline: Arc<PipelineConfig>,
        thread_id: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let thread_id = thread_id.into();
        let snapshot = service.fetch_state(&thread_id).await?;
        let mut session = Self::new(service, pipeline);
        debug!(session_id = %session.id, thread_id = %thread_id, "attaching to thread");

        let outcome = session
            .tracker
            .apply(&StreamEvent::new(snapshot.values.clone()), &session.progress);
        session.progress = outcome.progress;
        session.log.extend(outcome.log);
        session.state = if outcome.finished || outcome.final_output {
            WorkflowState::Complete
        } else {
            WorkflowState::Idle
        };
        if let Some(descriptor) = snapshot.pending_interrupt() {
            let interrupt = Interrupt::from_descriptor(descriptor);
            session.log.push(LogEntry::warning(format!(
                "Thread is paused waiting for {}",
                interrupt.kind
            )));
            session.interrupt = Some(interrupt);
            session.state = WorkflowState::Interrupted;
        }
        session.log.push(LogEntry::info(format!("Attached to thread {thread_id}")));
        session.thread_id = Some(thread_id);
        Ok(session)
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Tracing span tagged with this session and its thread.
    pub fn span(&self) -> tracing::Span {
        crate::observability::session_span(self.id, self.thread_id())
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn progress(&self) -> &PipelineProgress {
        &self.progress
    }

    pub fn interrupt(&self) -> Option<&Interrupt> {
        self.interrupt.as_ref()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        self.tracker.pipeline()
    }

    /// True while a stream is attached.
    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Cancellation handle for the active stream, usable from another task.
    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.active.as_ref().map(ActiveStream::abort_handle)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            thread_id: self.thread_id.clone(),
            state: self.state,
            statuses: self.progress.statuses.clone(),
            artifacts: self.progress.artifacts.clone(),
            interrupt: self.interrupt.clone(),
            log: self.log.entries().to_vec(),
        }
    }

    /// Starts a fresh run on a new thread.
    pub async fn start_run(&mut self, query: &str) -> Result<(), ClientError> {
        let result = self.try_start_run(query).await;
        self.settle(result)
    }

    /// Answers the pending interrupt and resumes the pipeline.
    pub async fn submit_decision(&mut self, decision: Decision) -> Result<(), ClientError> {
        let result = self.try_submit_decision(decision).await;
        self.settle(result)
    }

    /// Replaces a stage's output with `edited` and reruns everything after it.
    pub async fn request_rerun(
        &mut self,
        node: PipelineNode,
        edited: Value,
    ) -> Result<(), ClientError> {
        let result = self.try_request_rerun(node, edited).await;
        self.settle(result)
    }

    /// Cancels in-flight runs and the local stream, then pauses the session
    /// on a manual-stop interrupt built from the service snapshot.
    pub async fn request_stop(&mut self) -> Result<(), ClientError> {
        let result = self.try_request_stop().await;
        self.settle(result)
    }

    /// Reads and applies the next event of the active stream. `None` when no
    /// stream is attached.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let next = self.active.as_mut()?.next().await;
        let update = match next {
            Some(Ok(event)) => self.apply_event(event),
            Some(Err(err)) => {
                let message = err.to_string();
                self.fail(&message);
                SessionUpdate::Failed { message }
            }
            None => {
                self.active = None;
                self.drop_superseded_interrupt();
                if self.state == WorkflowState::Running {
                    self.state = WorkflowState::Idle;
                    self.log.push(LogEntry::info("Stream ended"));
                }
                SessionUpdate::Finished { state: self.state }
            }
        };
        Some(update)
    }

    async fn try_start_run(&mut self, query: &str) -> Result<(), ClientError> {
        self.ensure_idle_stream()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::Validation("query must not be empty".into()));
        }

        let thread_id = self.service.create_thread().await?;
        info!(session_id = %self.id, thread_id = %thread_id, "starting pipeline run");
        self.thread_id = Some(thread_id.clone());
        self.progress = PipelineProgress::default();
        self.interrupt = None;
        self.interrupt_superseded = false;
        self.log.clear();
        self.log.push(LogEntry::info(format!(
            "Starting pipeline on thread {thread_id}"
        )));

        let handle = self.service.open_run(&thread_id, query).await?;
        self.enter_running(handle);
        Ok(())
    }

    async fn try_submit_decision(&mut self, decision: Decision) -> Result<(), ClientError> {
        self.ensure_idle_stream()?;
        let thread_id = self.require_thread()?;
        let interrupt = self
            .interrupt
            .as_ref()
            .filter(|_| !self.interrupt_superseded)
            .ok_or(ClientError::NoInterrupt)?;
        let kind = interrupt.kind;
        let interrupt_id = interrupt.id.clone();
        let payload = build_resume_payload(kind, &decision)?;
        debug!(session_id = %self.id, thread_id = %thread_id, kind = %kind, "submitting decision");

        let handle = if kind == InterruptKind::ManualStop {
            let checkpoint = self.fresh_checkpoint(&thread_id).await?;
            let checkpoint = self
                .write_state(&thread_id, &checkpoint, payload, None)
                .await?;
            self.service
                .resume(&thread_id, &checkpoint, None, None)
                .await?
        } else {
            let interrupt_id = interrupt_id.ok_or(ClientError::MissingInterruptId)?;
            let checkpoint = self.fresh_checkpoint(&thread_id).await?;
            self.service
                .resume(&thread_id, &checkpoint, Some(payload), Some(&interrupt_id))
                .await?
        };

        self.log
            .push(LogEntry::info(format!("Submitted {kind} decision, resuming")));
        self.enter_running(handle);
        Ok(())
    }

    async fn try_request_rerun(
        &mut self,
        node: PipelineNode,
        edited: Value,
    ) -> Result<(), ClientError> {
        self.ensure_idle_stream()?;
        let thread_id = self.require_thread()?;
        let stage = self.pipeline().stage(node).clone();
        let fits = match stage.shape {
            ArtifactShape::List => edited.is_array(),
            ArtifactShape::Object => edited.is_object(),
        };
        if !fits {
            return Err(ClientError::Validation(format!(
                "{} expects {} data",
                stage.artifact_field,
                match stage.shape {
                    ArtifactShape::List => "a list of",
                    ArtifactShape::Object => "an object of",
                }
            )));
        }
        debug!(session_id = %self.id, thread_id = %thread_id, node = %node, "rerunning from node");

        let checkpoint = self.fresh_checkpoint(&thread_id).await?;
        let mut values = serde_json::Map::new();
        values.insert(stage.artifact_field.clone(), edited.clone());
        let checkpoint = self
            .write_state(
                &thread_id,
                &checkpoint,
                Value::Object(values),
                Some(&stage.backend_name),
            )
            .await?;
        let handle = self
            .service
            .resume(&thread_id, &checkpoint, None, None)
            .await?;

        invalidate_downstream(self.tracker.pipeline(), &mut self.progress.statuses, node);
        self.progress.artifacts.replace(node, edited);
        self.log
            .push(LogEntry::info(format!("Rerunning pipeline from {node}")));
        self.enter_running(handle);
        Ok(())
    }

    async fn try_request_stop(&mut self) -> Result<(), ClientError> {
        let thread_id = self.require_thread()?;
        info!(session_id = %self.id, thread_id = %thread_id, "stopping pipeline");

        let runs = self.service.list_runs(&thread_id).await?;
        for run in runs.iter().filter(|run| run.status.is_in_flight()) {
            debug!(thread_id = %thread_id, run_id = %run.run_id, "cancelling run");
            self.service.cancel_run(&thread_id, &run.run_id).await?;
        }
        if let Some(active) = self.active.take() {
            active.retire();
        }

        let snapshot = self.service.fetch_state(&thread_id).await?;
        let resume_from = snapshot
            .next
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_RESUME_NODE.to_string());
        self.log.push(LogEntry::warning(format!(
            "Pipeline stopped; it will resume from {resume_from}"
        )));
        self.interrupt = Some(Interrupt::manual_stop(snapshot.values, resume_from));
        self.interrupt_superseded = false;
        self.state = WorkflowState::Stopped;
        Ok(())
    }

    fn apply_event(&mut self, event: StreamEvent) -> SessionUpdate {
        self.drop_superseded_interrupt();

        let outcome = self.tracker.apply(&event, &self.progress);
        self.progress = outcome.progress;
        self.log.extend(outcome.log);
        if outcome.finished || outcome.final_output {
            self.state = WorkflowState::Complete;
        }

        if let Some(interrupt) = detect(&event) {
            let kind = interrupt.kind;
            self.log.push(
                LogEntry::warning(format!("Pipeline paused for {kind}"))
                    .with_payload(interrupt.value.clone()),
            );
            self.interrupt = Some(interrupt);
            self.state = WorkflowState::Interrupted;
            if let Some(active) = self.active.take() {
                active.retire();
            }
            return SessionUpdate::Interrupted(kind);
        }
        SessionUpdate::Event { state: self.state }
    }

    fn enter_running(&mut self, handle: StreamHandle) {
        let stream = ActiveStream::attach(handle);
        debug!(session_id = %self.id, run_id = ?stream.run_id(), "stream attached");
        if let Some(previous) = self.active.replace(stream) {
            previous.retire();
        }
        if self.interrupt.is_some() {
            self.interrupt_superseded = true;
        }
        self.state = WorkflowState::Running;
    }

    fn drop_superseded_interrupt(&mut self) {
        if self.interrupt_superseded {
            self.interrupt = None;
            self.interrupt_superseded = false;
        }
    }

    async fn fresh_checkpoint(&self, thread_id: &str) -> Result<Checkpoint, ClientError> {
        let snapshot = self.service.fetch_state(thread_id).await?;
        snapshot.checkpoint().ok_or(ClientError::MissingCheckpoint)
    }

    /// Updates state and returns the checkpoint to continue from, falling
    /// back to a fresh fetch when the service does not report one.
    async fn write_state(
        &self,
        thread_id: &str,
        checkpoint: &Checkpoint,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<Checkpoint, ClientError> {
        match self
            .service
            .update_state(thread_id, checkpoint, values, as_node)
            .await?
        {
            Some(updated) => Ok(updated),
            None => self.fresh_checkpoint(thread_id).await,
        }
    }

    fn ensure_idle_stream(&self) -> Result<(), ClientError> {
        if self.active.is_some() {
            return Err(ClientError::Busy);
        }
        Ok(())
    }

    fn require_thread(&self) -> Result<String, ClientError> {
        self.thread_id.clone().ok_or(ClientError::NoThread)
    }

    fn settle(&mut self, result: Result<(), ClientError>) -> Result<(), ClientError> {
        if let Err(err) = &result {
            if err.is_precondition() {
                self.log.push(LogEntry::error(err.to_string()));
            } else {
                self.fail(&err.to_string());
            }
        }
        result
    }

    fn fail(&mut self, message: &str) {
        if let Some(active) = self.active.take() {
            active.retire();
        }
        self.state = WorkflowState::Error;
        self.log.push(LogEntry::error(message));
    }
}
