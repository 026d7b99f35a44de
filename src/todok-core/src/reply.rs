//! Streaming reply handed out by [`DebateBot::chat_stream`](crate::bot::DebateBot::chat_stream).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::time::{Instant, Sleep};
use tracing::{error, info, warn};

use crate::bot::DebateSession;
use crate::error::DebateError;
use crate::model::FragmentStream;

/// Fragments of the model's reply to the latest turn.
///
/// Items are yielded in arrival order and their concatenation is the reply.
/// The stream ends after the model finishes, or after yielding a single
/// `Err` for a transport failure or an expired deadline. Whatever arrived is
/// written back to the session when the stream ends or is dropped.
pub struct ReplyStream<'a> {
    session: &'a mut DebateSession,
    inner: FragmentStream,
    reply: String,
    deadline: Option<(Pin<Box<Sleep>>, Duration)>,
    finished: bool,
}

impl<'a> ReplyStream<'a> {
    pub(crate) fn new(session: &'a mut DebateSession, inner: FragmentStream) -> Self {
        Self {
            session,
            inner,
            reply: String::new(),
            deadline: None,
            finished: false,
        }
    }

    /// Give up waiting once `timeout` has elapsed from now.
    ///
    /// This only stops polling the model; the request itself is dropped, not
    /// cancelled upstream.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some((Box::pin(tokio::time::sleep(timeout)), timeout));
        self
    }

    /// Text received so far.
    pub fn partial(&self) -> &str {
        &self.reply
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The configured timeout, if its deadline has already passed.
    fn expired(&self) -> Option<Duration> {
        self.deadline
            .as_ref()
            .filter(|(sleep, _)| sleep.deadline() <= Instant::now())
            .map(|(_, timeout)| *timeout)
    }

    fn time_out(&mut self, timeout: Duration) -> Poll<Option<Result<String, DebateError>>> {
        warn!(?timeout, "Model reply timed out");
        self.finish();
        Poll::Ready(Some(Err(DebateError::TimeoutExceeded(timeout))))
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let reply = std::mem::take(&mut self.reply);
        info!(chars = reply.chars().count(), "Reply recorded");
        self.session.record_reply(reply);
    }
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String, DebateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        // Fragments that are already buffered must not outrun the deadline.
        if let Some(timeout) = this.expired() {
            return this.time_out(timeout);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.reply.push_str(&fragment);
                return Poll::Ready(Some(Ok(fragment)));
            }
            Poll::Ready(Some(Err(e))) => {
                error!("Error while streaming reply: {}", e);
                this.finish();
                let e = match e {
                    DebateError::StreamTransport(_) => e,
                    other => DebateError::StreamTransport(other.to_string()),
                };
                return Poll::Ready(Some(Err(e)));
            }
            Poll::Ready(None) => {
                this.finish();
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        if let Some((sleep, timeout)) = this.deadline.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                let timeout = *timeout;
                return this.time_out(timeout);
            }
        }

        Poll::Pending
    }
}

impl fmt::Debug for ReplyStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyStream")
            .field("reply", &self.reply)
            .field("timeout", &self.deadline.as_ref().map(|(_, t)| *t))
            .field("finished", &self.finished)
            .finish()
    }
}

impl Drop for ReplyStream<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
