//! Read deadline for feed frame streams.
//!
//! A connection that silently stops delivering frames does not always produce a
//! transport error. [`ReadDeadline`] turns that silence into a terminal
//! [`FeedError::ReadTimeout`], so the feed loop logs the cause and reconnects.

use crate::error::FeedError;
use futures::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{Instant, Sleep};

/// Default read timeout for feed connections (2 minutes).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Frame stream that fails with [`FeedError::ReadTimeout`] once `read_timeout` passes
/// without a frame, and ends right after.
#[derive(Debug)]
pub struct ReadDeadline<S> {
    frames: S,
    read_timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    expired: bool,
}

impl<S> ReadDeadline<S> {
    pub fn new(frames: S, read_timeout: Duration) -> Self {
        Self {
            frames,
            read_timeout,
            deadline: Box::pin(tokio::time::sleep(read_timeout)),
            expired: false,
        }
    }
}

impl<S> Stream for ReadDeadline<S>
where
    S: Stream<Item = Result<String, FeedError>> + Unpin,
{
    type Item = Result<String, FeedError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.expired {
            return Poll::Ready(None);
        }

        if let Poll::Ready(frame) = Pin::new(&mut self.frames).poll_next(cx) {
            if frame.is_some() {
                let next_deadline = Instant::now() + self.read_timeout;
                self.deadline.as_mut().reset(next_deadline);
            }
            return Poll::Ready(frame);
        }

        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.expired = true;
                Poll::Ready(Some(Err(FeedError::ReadTimeout(self.read_timeout))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
