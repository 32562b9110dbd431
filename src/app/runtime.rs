use super::{PipelineOrchestrator, ShutdownReason};
use crate::error::{EventBusError, LiveLabelError, Result};
use crate::events::{EventFilter, PipelineEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl PipelineOrchestrator {
    /// Run the pipeline until a signal or a quit request, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| LiveLabelError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| LiveLabelError::system("Shutdown receiver already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.spawn_command_listener(shutdown_sender);

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                keyboard_handler.start().await?;
                info!("Keyboard input enabled - 's' switches camera, 'q' quits");
            }
        }

        let status = self.on_appear().await;
        info!("Live label pipeline is running ({:?})", status);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| LiveLabelError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Live label shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: SharedShutdownSender) {
        // Handle SIGTERM - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(&shutdown_sender_sigterm, ShutdownReason::Signal("SIGTERM".to_string()))
                        .await;
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }

    /// Act on user commands published on the event bus
    fn spawn_command_listener(&self, shutdown_sender: SharedShutdownSender) {
        let mut commands = self.event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["switch_camera_requested", "shutdown_requested"]),
            "commands",
        );
        let registry = Arc::clone(&self.registry);
        let token = self.cancellation_token.child_token();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = commands.recv() => event,
                };

                match event {
                    Ok(PipelineEvent::SwitchCameraRequested) => {
                        if registry.switch_camera().is_none() {
                            info!("No other camera to switch to");
                        }
                    }
                    Ok(PipelineEvent::ShutdownRequested { reason }) => {
                        send_shutdown(&shutdown_sender, ShutdownReason::UserRequest(reason)).await;
                    }
                    Ok(_) => {}
                    Err(EventBusError::Lagged { .. }) => continue,
                    Err(_) => break,
                }
            }
        });
    }
}

async fn send_shutdown(shutdown_sender: &SharedShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = shutdown_sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
