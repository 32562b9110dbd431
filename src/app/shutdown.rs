use super::PipelineOrchestrator;
use crate::error::Result;
use crate::status::RunStatus;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

impl PipelineOrchestrator {
    /// Stop capture, then cancel the frame loop and the orientation monitor.
    ///
    /// An inference already in flight finishes, but its result is discarded
    /// because capture is no longer running.
    pub async fn stop(&self) -> RunStatus {
        let status = self.registry.stop().await;

        self.orientation.stop().await;

        let frame_loop = self.frame_loop.lock().take();
        if let Some((token, handle)) = frame_loop {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Frame loop task failed: {}", e);
            }
        }

        status
    }

    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                if let Err(e) = keyboard_handler.stop().await {
                    error!("Error stopping keyboard: {}", e);
                    exit_code = 1;
                }
            }
        }

        let stop_timeout = Duration::from_secs(self.config.system.stop_timeout_seconds);
        match timeout(stop_timeout, self.stop()).await {
            Ok(status) => debug!("Capture stopped in state {:?}", status),
            Err(_) => {
                error!("Capture stop timed out after {:?}", stop_timeout);
                exit_code = 1;
            }
        }

        // Cancel the state holder and any remaining background tasks
        self.cancellation_token.cancel();

        if let Some(holder_task) = self.holder_task.take() {
            if let Err(e) = holder_task.await {
                error!("State holder task failed: {}", e);
                exit_code = 1;
            }
        }

        let stats = self.engine.stats();
        info!(
            "Classifier stats: {} inferences, {} dropped busy, {} below threshold, {} discarded after stop",
            stats.inferences, stats.dropped_busy, stats.rejected_below_threshold, stats.discarded_stale
        );

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
