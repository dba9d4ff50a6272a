//! Common imports for driving a session.
pub use crate::{
    AbortHandle, ClientError, Decision, HttpService, InterruptKind, OrchestrationService,
    PipelineConfig, PipelineNode, ServiceConfig, Session, SessionUpdate, UserInput,
    WorkflowState,
};
