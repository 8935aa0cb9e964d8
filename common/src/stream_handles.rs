//! Handles to background tasks that pump live data, spawned on tokio.
use futures::{Future, FutureExt};

#[derive(thiserror::Error, Debug)]
pub enum StreamHandleError {
    #[error("The stream was closed")]
    StreamClosed,
    #[error(transparent)]
    JoinHandleError(#[from] tokio::task::JoinError),
}

/// A handle to a spawned pump.
/// The task can be joined by awaiting its Future implementation.
/// All spawned tasks are detached, so awaiting the handle is not required.
#[allow(async_fn_in_trait)]
pub trait StreamHandle:
    Future<Output = Result<<Self as StreamHandle>::StreamOutput, StreamHandleError>>
{
    /// The Output type for the stream
    type StreamOutput;
    /// Signal the stream to end
    /// Does not wait for the stream to end, so will not receive the result of stream.
    fn end(&self);
    /// End the stream and asyncronously wait for it to shutdown, getting the result of its
    /// execution.
    async fn end_and_wait(self) -> Result<Self::StreamOutput, StreamHandleError>
    where
        Self: Sized,
    {
        self.end();
        self.await
    }
    /// Get an Abort Handle to the stream.
    /// This handle may be cloned/sent/etc easily
    /// and many handles may exist at once.
    fn abort_handle(&self) -> Box<dyn AbortHandle>;
}

/// A handle that can be moved/cloned/sent, but can only close the stream.
pub trait AbortHandle: Send + Sync {
    /// Send a signal to end the stream, without waiting for a result.
    fn end(&self);
    fn is_finished(&self) -> bool;
}

pub struct TokioStreamHandle<T> {
    inner: tokio::task::JoinHandle<T>,
}

impl<T> Future for TokioStreamHandle<T> {
    type Output = Result<T, StreamHandleError>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.inner.poll_unpin(cx).map_err(|e| {
            if e.is_cancelled() {
                StreamHandleError::StreamClosed
            } else {
                StreamHandleError::from(e)
            }
        })
    }
}

impl<T> StreamHandle for TokioStreamHandle<T> {
    type StreamOutput = T;

    fn end(&self) {
        self.inner.abort();
    }

    fn abort_handle(&self) -> Box<dyn AbortHandle> {
        Box::new(self.inner.abort_handle())
    }
}

impl AbortHandle for tokio::task::AbortHandle {
    fn end(&self) {
        self.abort()
    }

    fn is_finished(&self) -> bool {
        self.is_finished()
    }
}

/// Spawn a future on the tokio runtime.
pub fn spawn<F>(future: F) -> TokioStreamHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    TokioStreamHandle {
        inner: tokio::task::spawn(future),
    }
}
