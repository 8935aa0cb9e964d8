use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Aborts pending waits on any cursor it is passed to.
///
/// Cancelling is idempotent and only affects waits that use this controller
/// (or one of its children). The cursor itself stays usable, so a caller can
/// wait again with a fresh controller.
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A controller that is cancelled whenever this one is, but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Resolves once the controller is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl From<CancellationToken> for CancellationController {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}
