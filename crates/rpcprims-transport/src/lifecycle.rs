use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Server lifecycle owned by the process entry point.
///
/// Two independent stop levels:
/// - [`stop_accepting`](Self::stop_accepting) closes the listener; live
///   connections keep running. This is what the `/shutdown` endpoint does.
/// - [`terminate`](Self::terminate) also cancels every live connection.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct ServerLifecycle {
    terminate: CancellationToken,
    accepting: CancellationToken,
}

impl ServerLifecycle {
    /// Create a lifecycle in the running state.
    pub fn new() -> Self {
        let terminate = CancellationToken::new();
        let accepting = terminate.child_token();
        Self {
            terminate,
            accepting,
        }
    }

    /// Stop accepting new connections.
    pub fn stop_accepting(&self) {
        self.accepting.cancel();
    }

    /// Stop accepting and abort all live connections.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    /// Whether the listener should still accept connections.
    pub fn is_accepting(&self) -> bool {
        !self.accepting.is_cancelled()
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminate.is_cancelled()
    }

    /// Resolves once accepting has stopped.
    pub fn accepting_stopped(&self) -> WaitForCancellationFuture<'_> {
        self.accepting.cancelled()
    }

    /// Resolves once the server is terminated.
    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.terminate.cancelled()
    }

    /// Token for one connection; cancelled on terminate.
    pub fn connection_token(&self) -> CancellationToken {
        self.terminate.child_token()
    }
}

impl Default for ServerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
