//! Client core for a human-in-the-loop pipeline dashboard.
//!
//! A [`Session`] starts runs on an orchestration service, decodes the event
//! stream, tracks stage progress, pauses on interrupts and resumes from
//! service checkpoints with the operator's decision.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dashboard_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let service = Arc::new(HttpService::from_env()?);
//! let mut session = Session::new(service, Arc::new(PipelineConfig::default()));
//! session.start_run("spring streetwear trends").await?;
//!
//! while let Some(update) = session.next_update().await {
//!     if let SessionUpdate::Interrupted(InterruptKind::ReviewOutfit) = update {
//!         session.submit_decision(Decision::approve()).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Operator decisions and resume payloads.
pub mod decision;
/// Public error types.
pub mod errors;
/// Typed view over decoded stream events.
pub mod event;
/// `data:` line decoding over chunked bytes.
pub mod frame;
/// Interrupt detection and classification.
pub mod interrupt;
/// User-visible message log.
pub mod log;
/// Tracing subscriber setup and session spans.
pub mod observability;
/// Pipeline stages, aliases and the rerun dependency table.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// Orchestration service contract and HTTP client.
pub mod service;
/// Session state machine.
pub mod session;
/// Active stream and its cancellation handle.
pub mod stream;
/// Stage status and artifact tracking.
pub mod tracker;

pub use decision::{Decision, ReviewDecision, UserInput, build_resume_payload};
pub use errors::{ClientError, MISSING_CHECKPOINT_REMEDIATION, ServiceError};
pub use event::StreamEvent;
pub use frame::{FrameDecoder, decode_events};
pub use interrupt::{Interrupt, InterruptKind, classify, detect};
pub use log::{LogEntry, LogLevel, MessageLog};
pub use pipeline::{ArtifactShape, PipelineConfig, PipelineNode, StageSpec};
pub use service::{
    Checkpoint, HttpService, OrchestrationService, Run, RunStatus, ServiceConfig, StreamHandle,
    ThreadState,
};
pub use session::{Session, SessionSnapshot, SessionUpdate, WorkflowState};
pub use stream::AbortHandle;
pub use tracker::{
    ArtifactStore, NodeArtifact, NodeStatus, NodeStatusSet, PipelineProgress, StatusTracker,
    TrackerOutcome,
};
