//! Orderly dispatcher shutdown

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::dispatcher::DispatchHandle;
use crate::error::{Result, SherpaError};

/// Drains the dispatcher and waits for its task to finish.
///
/// `stop` consumes the coordinator, so it runs at most once.
pub struct ShutdownCoordinator {
    handle: DispatchHandle,
    task: JoinHandle<()>,
}

impl ShutdownCoordinator {
    pub fn new(handle: DispatchHandle, task: JoinHandle<()>) -> Self {
        Self { handle, task }
    }

    /// Send `Shutdown`, wait for the dispatcher to report stopped, then release the intake
    #[instrument(skip(self))]
    pub async fn stop(self) -> Result<()> {
        match self.handle.shutdown().await {
            Ok(stopped) => {
                if stopped.await.is_err() {
                    warn!("Dispatcher exited without acknowledging shutdown");
                }
            }
            // Already stopped because every producer went away.
            Err(SherpaError::DispatcherClosed) => {}
            Err(e) => return Err(e),
        }

        drop(self.handle);
        self.task
            .await
            .map_err(|e| SherpaError::Internal(format!("dispatcher task failed: {}", e)))?;

        info!("Dispatcher shut down");
        Ok(())
    }
}
