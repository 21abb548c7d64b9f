//! Observable completion of a mirrored write.

use tokio::sync::watch;

use crate::store::Revision;

/// Where a write stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteState {
    /// Applied locally, not yet confirmed by the store.
    Pending,
    /// Stored at this revision.
    Committed(Revision),
    /// Failed after retries; the reason is shown to the shopper.
    Failed(String),
}

impl WriteState {
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Handle to a write issued by a mirror.
///
/// Several mutations coalesced into one store call share a handle.
#[derive(Debug, Clone)]
pub struct WriteHandle {
    state: watch::Receiver<WriteState>,
}

impl WriteHandle {
    /// A handle that is already settled.
    #[must_use]
    pub fn settled(state: WriteState) -> Self {
        let (_tx, state) = watch::channel(state);
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> WriteState {
        self.state.borrow().clone()
    }

    /// Wait until the write commits or fails.
    ///
    /// A handle whose completer was dropped without settling reports
    /// [`WriteState::Failed`].
    pub async fn wait(&mut self) -> WriteState {
        match self.state.wait_for(WriteState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => WriteState::Failed("write abandoned".to_string()),
        }
    }
}

/// Settles every handle cloned from [`WriteCompleter::handle`].
#[derive(Debug)]
pub(crate) struct WriteCompleter {
    state: watch::Sender<WriteState>,
}

impl WriteCompleter {
    pub(crate) fn new() -> Self {
        Self {
            state: watch::Sender::new(WriteState::Pending),
        }
    }

    pub(crate) fn handle(&self) -> WriteHandle {
        WriteHandle {
            state: self.state.subscribe(),
        }
    }

    pub(crate) fn commit(self, revision: Revision) {
        self.state.send_replace(WriteState::Committed(revision));
    }

    pub(crate) fn fail(self, reason: impl Into<String>) {
        self.state.send_replace(WriteState::Failed(reason.into()));
    }
}
