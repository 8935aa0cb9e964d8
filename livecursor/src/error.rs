use crate::cursor::CursorState;
use livecursor_common::{ErrorCode, RetryableError};
use livecursor_proto::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CursorError>;

/// Why a wait stopped before rows arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The wait's timeout elapsed
    Timeout,
    /// The caller's controller was cancelled
    Requested,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Timeout => f.write_str("timed out"),
            CancelReason::Requested => f.write_str("cancellation requested"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CursorError {
    /// A wait was aborted. The subscription is still usable.
    #[error("wait for rows cancelled: {0}")]
    Cancelled(CancelReason),
    /// The upstream failed. The cursor must be closed and a new subscription opened.
    #[error("subscription faulted: {reason}")]
    Faulted { reason: String },
    /// The caller broke the cursor's state machine.
    #[error("cannot {operation} while cursor is {state}")]
    InvalidState {
        operation: &'static str,
        state: CursorState,
    },
    /// The initial connection could not be established.
    #[error("failed to connect: {0}")]
    Connection(#[source] TransportError),
}

impl CursorError {
    pub(crate) fn invalid(operation: &'static str, state: CursorState) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }
}

impl RetryableError for CursorError {
    /// Whether trying the same call again could succeed. A faulted cursor never
    /// recovers; the caller has to open a new subscription.
    fn is_retryable(&self) -> bool {
        use CursorError::*;
        match self {
            Cancelled(_) => true,
            Faulted { .. } => false,
            InvalidState { .. } => false,
            Connection(e) => e.is_retryable(),
        }
    }
}

impl ErrorCode for CursorError {
    fn error_code(&self) -> &'static str {
        use CursorError::*;
        match self {
            Cancelled(_) => "CursorError::Cancelled",
            Faulted { .. } => "CursorError::Faulted",
            InvalidState { .. } => "CursorError::InvalidState",
            Connection(e) => e.error_code(),
        }
    }
}
