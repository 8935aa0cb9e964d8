use crate::frame::{Frame, SubscribeRequest};
use livecursor_common::{BoxDynError, BoxDynStream, ErrorCode, RetryableError};
use std::sync::Arc;
use thiserror::Error;

/// Frames coming from a live source, in emission order.
pub type FrameStream = BoxDynStream<'static, Result<Frame, TransportError>>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("source at \"{uri}\" is unreachable: {reason}")]
    Unreachable { uri: String, reason: String },
    #[error("source rejected the subscription [{code}]: {message}")]
    Rejected { code: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("subscriber fell more than {backlog} frames behind")]
    Lagged { backlog: usize },
    #[error("frame exceeds {limit} bytes")]
    Oversized { limit: usize },
    #[error("{0}")]
    Other(BoxDynError),
}

impl TransportError {
    pub fn unreachable(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        use TransportError::*;
        match self {
            Unreachable { .. } | Io(_) | Closed | Lagged { .. } => true,
            Rejected { .. } | Decode(_) | Oversized { .. } | Other(_) => false,
        }
    }
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        use TransportError::*;
        match self {
            Unreachable { .. } => "TransportError::Unreachable",
            Rejected { .. } => "TransportError::Rejected",
            Io(_) => "TransportError::Io",
            Decode(_) => "TransportError::Decode",
            Closed => "TransportError::Closed",
            Lagged { .. } => "TransportError::Lagged",
            Oversized { .. } => "TransportError::Oversized",
            Other(_) => "TransportError::Other",
        }
    }
}

/// The network or process layer that feeds a subscription.
///
/// Implementations establish the connection inside `subscribe` and report an
/// unreachable source there. Failures after that point are yielded through
/// the returned stream.
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<FrameStream, TransportError>;
}

#[async_trait::async_trait]
impl<T> LiveTransport for Arc<T>
where
    T: LiveTransport + ?Sized,
{
    async fn subscribe(&self, request: SubscribeRequest) -> Result<FrameStream, TransportError> {
        (**self).subscribe(request).await
    }
}

#[async_trait::async_trait]
impl<T> LiveTransport for Box<T>
where
    T: LiveTransport + ?Sized,
{
    async fn subscribe(&self, request: SubscribeRequest) -> Result<FrameStream, TransportError> {
        (**self).subscribe(request).await
    }
}
