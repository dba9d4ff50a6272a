use futures::StreamExt as _;
use tokio::sync::watch;

use crate::errors::ServiceError;
use crate::event::StreamEvent;
use crate::frame::{EventStream, decode_events};
use crate::service::StreamHandle;

/// Handle used to cancel the session's active stream from another task.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// Requests cancellation. Calling it again is a no-op.
    ///
    /// The stream ends at its next read as if the body had finished.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The single live event stream of a session.
pub(crate) struct ActiveStream {
    events: EventStream,
    abort: AbortHandle,
    run_id: Option<String>,
}

impl ActiveStream {
    pub(crate) fn attach(handle: StreamHandle) -> Self {
        let (abort, abort_rx) = AbortHandle::new();
        Self {
            events: decode_events(handle.body, abort_rx),
            abort,
            run_id: handle.run_id,
        }
    }

    pub(crate) async fn next(&mut self) -> Option<Result<StreamEvent, ServiceError>> {
        self.events
            .next()
            .await
            .map(|event| event.map(StreamEvent::new))
    }

    pub(crate) fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub(crate) fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Aborts and drops the stream.
    pub(crate) fn retire(self) {
        self.abort.abort();
    }
}
