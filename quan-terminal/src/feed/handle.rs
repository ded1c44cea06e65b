use super::FeedTarget;
use derive_more::Display;
use tokio::task::JoinHandle;
use tracing::debug;

/// Connection state of a feed, as shown by the status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    /// No handle exists for the feed
    Idle,
    Connecting,
    Open,
    Closed,
}

/// One live connection backing a feed's current target.
///
/// The handle owns the task running the connection and its reconnect timer; aborting
/// that task is the only way the connection and any pending reconnect are cancelled.
#[derive(Debug)]
pub struct FeedHandle {
    target: FeedTarget,
    generation: u64,
    state: ConnectionState,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn new(target: FeedTarget, generation: u64, task: Option<JoinHandle<()>>) -> Self {
        Self {
            target,
            generation,
            state: ConnectionState::Connecting,
            task,
        }
    }

    pub fn target(&self) -> &FeedTarget {
        &self.target
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Closed -> Connecting, when the reconnect timer fires.
    pub fn on_connecting(&mut self) -> bool {
        self.transition(ConnectionState::Connecting, &[ConnectionState::Closed])
    }

    /// Connecting -> Open
    pub fn on_open(&mut self) -> bool {
        self.transition(ConnectionState::Open, &[ConnectionState::Connecting])
    }

    /// Connecting | Open -> Closed, when the transport drops or fails to connect.
    pub fn on_close(&mut self) -> bool {
        self.transition(
            ConnectionState::Closed,
            &[ConnectionState::Connecting, ConnectionState::Open],
        )
    }

    fn transition(&mut self, next: ConnectionState, from: &[ConnectionState]) -> bool {
        if !from.contains(&self.state) {
            debug!(
                kind = %self.target.kind,
                generation = self.generation,
                state = %self.state,
                %next,
                "ignoring feed transition"
            );
            return false;
        }

        self.state = next;
        true
    }

    /// Tear the handle down: abort the connection task (and with it any pending
    /// reconnect). Closing an already-closed handle is a no-op.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state = ConnectionState::Closed;
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_torn_down(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.close();
    }
}
