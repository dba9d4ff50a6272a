/// Errors returned by an orchestration service implementation before they are
/// interpreted by the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Service answered with a non-success HTTP status.
    #[error("service error (status {status}): {message}")]
    Http { status: u16, message: String },
    /// Connection or stream I/O failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Service response shape was not what the client expects.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl ServiceError {
    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Http { message, .. }
            | Self::Transport { message }
            | Self::Protocol { message } => message,
        }
    }
}

/// Message shown when a resume is attempted without a usable checkpoint.
pub const MISSING_CHECKPOINT_REMEDIATION: &str = "No checkpoint is available for this thread. \
Refresh the thread state or start a new run before resuming.";

/// Top-level error type for session commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client or pipeline configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Operator input did not fit the pending interrupt.
    #[error("validation error: {0}")]
    Validation(String),
    /// A stream is already active; start/resume/rerun must wait for it.
    #[error("a stream is already active for this session")]
    Busy,
    /// The command needs a thread but the session has none yet.
    #[error("session has no thread")]
    NoThread,
    /// The command needs a pending interrupt but there is none.
    #[error("no interrupt is pending")]
    NoInterrupt,
    /// The service did not provide a checkpoint to resume from.
    #[error("{}", MISSING_CHECKPOINT_REMEDIATION)]
    MissingCheckpoint,
    /// The pending interrupt carries no id to resume against.
    #[error("the pending interrupt has no id; refresh the thread state before resuming")]
    MissingInterruptId,
    /// Service call failed.
    #[error(transparent)]
    Service(ServiceError),
}

impl ClientError {
    /// Precondition failures leave the workflow state untouched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Busy
                | Self::NoThread
                | Self::NoInterrupt
                | Self::MissingCheckpoint
                | Self::MissingInterruptId
                | Self::Validation(_)
        )
    }
}

impl From<ServiceError> for ClientError {
    fn from(value: ServiceError) -> Self {
        ClientError::Service(value)
    }
}
