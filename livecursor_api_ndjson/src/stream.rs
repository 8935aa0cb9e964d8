use std::{
    pin::Pin,
    task::{ready, Context, Poll},
};

use futures::{stream::FusedStream, Stream};
use livecursor_proto::{Frame, TransportError};
use pin_project_lite::pin_project;

pin_project! {
    /// Ends a frame stream once it yields an error or a terminal frame.
    ///
    /// The item that ends the stream is still yielded. Afterwards the inner
    /// stream is never polled again, so a half-read socket is not touched
    /// after the source said it was done.
    pub struct TerminatingStream<S> {
        #[pin] inner: S,
        done: bool,
    }
}

impl<S> TerminatingStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, done: false }
    }
}

impl<S> Stream for TerminatingStream<S>
where
    S: Stream<Item = Result<Frame, TransportError>>,
{
    type Item = Result<Frame, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        let item = ready!(this.inner.poll_next(cx));
        match &item {
            Some(Err(e)) => {
                tracing::warn!(error = %e, "frame stream failed");
                *this.done = true;
            }
            Some(Ok(frame)) if frame.is_terminal() => {
                tracing::debug!(frame = frame.name(), "frame stream finished");
                *this.done = true;
            }
            None => *this.done = true,
            Some(Ok(_)) => (),
        }
        Poll::Ready(item)
    }
}

impl<S> FusedStream for TerminatingStream<S>
where
    S: Stream<Item = Result<Frame, TransportError>>,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    #[tokio::test]
    async fn stops_after_terminal_frame() {
        let inner = stream::iter(vec![
            Ok(Frame::Heartbeat),
            Ok(Frame::End),
            Ok(Frame::Heartbeat),
        ]);
        let mut s = TerminatingStream::new(inner);
        assert!(matches!(s.next().await, Some(Ok(Frame::Heartbeat))));
        assert!(matches!(s.next().await, Some(Ok(Frame::End))));
        assert!(s.is_terminated());
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn stops_after_error() {
        let inner = stream::iter(vec![Err(TransportError::Closed), Ok(Frame::Heartbeat)]);
        let frames: Vec<_> = TerminatingStream::new(inner).collect().await;
        assert_eq!(frames.len(), 1);
    }
}
