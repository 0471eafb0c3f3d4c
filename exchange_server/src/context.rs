use tokio_util::sync::CancellationToken;

/// Cancellation scope threaded through an exchange.
///
/// Handlers receive a clone of the exchange's context and are expected to
/// honor cancellation cooperatively: a cancelled call should abort promptly
/// and return a [`Cancellation`](exchange_rpc::rpc::Cancellation) error.
/// The engine derives a child context per batch so that a write failure
/// cancels the remaining handlers without touching the caller's scope.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child context. Cancelling the parent cancels the child;
    /// cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Cancels this context and all contexts derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
