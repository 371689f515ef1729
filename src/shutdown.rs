//! Cooperative shutdown token threaded through every long-lived task on both
//! binaries, so a `SIGINT`/`SIGTERM` drains selects instead of aborting tasks
//! mid-write (§5).

use tokio::signal;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::info;

#[derive(Clone, Default)]
pub struct Shutdown(CancellationToken);

impl Shutdown {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn shutdown(&self) {
        self.0.cancel();
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.0.cancelled()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves on `SIGINT`/`SIGTERM` (or an already-cancelled token) and
    /// cancels the token, matching the teacher's `shutdown_signal`. Intended
    /// to be handed to `axum::serve(..).with_graceful_shutdown(..)`.
    pub async fn wait_for_signal(self) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = self.cancelled() => return,
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        info!("starting to shut down...");
        self.shutdown();
    }
}
