//! Consumer side of a session

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::StreamEvent;
use crate::state::RunState;

/// Ordered events of one running session.
///
/// Dropping the stream, or calling [`SessionStream::cancel`], closes the
/// channel; the session stops at its next await point without emitting
/// anything further.
#[derive(Debug)]
pub struct SessionStream {
    session_id: String,
    receiver: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<RunState>,
}

impl SessionStream {
    pub(crate) fn new(
        session_id: String,
        receiver: mpsc::Receiver<StreamEvent>,
        task: JoinHandle<RunState>,
    ) -> Self {
        Self {
            session_id,
            receiver,
            task,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the session has ended
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Stop the session. Events already queued can still be read.
    pub fn cancel(&mut self) {
        self.receiver.close();
    }

    /// Discard unread events and return the final run state.
    ///
    /// Returns `None` if the session task did not complete normally.
    pub async fn into_state(mut self) -> Option<RunState> {
        while self.receiver.recv().await.is_some() {}
        self.task.await.ok()
    }
}
