use crate::error::Result;
use crate::events::{EventBus, PipelineEvent};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal keys turned into pipeline commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    SwitchCamera,
    Quit,
}

impl KeyCommand {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyCommand::SwitchCamera),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyCommand::Quit),
            _ => None,
        }
    }

    fn event(&self) -> PipelineEvent {
        match self {
            KeyCommand::SwitchCamera => PipelineEvent::SwitchCameraRequested,
            KeyCommand::Quit => PipelineEvent::ShutdownRequested {
                reason: "User requested via keyboard".to_string(),
            },
        }
    }
}

/// Reads single key presses from the terminal in raw mode
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }
            debug!("Raw mode enabled");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(command) = KeyCommand::from_key(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        info!("Key command: {:?}", command);
                        let event_bus = Arc::clone(&event_bus);
                        runtime_handle.spawn(async move {
                            if let Err(e) = event_bus.publish(command.event()).await {
                                warn!("Failed to publish key command: {}", e);
                            }
                        });

                        if command == KeyCommand::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to leave raw mode itself
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyCommand::from_key(KeyCode::Char('s')), Some(KeyCommand::SwitchCamera));
        assert_eq!(KeyCommand::from_key(KeyCode::Char('q')), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key(KeyCode::Esc), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key(KeyCode::Char(' ')), None);
    }

    #[test]
    fn test_quit_maps_to_shutdown_request() {
        match KeyCommand::Quit.event() {
            PipelineEvent::ShutdownRequested { reason } => assert!(reason.contains("keyboard")),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let handler = KeyboardInputHandler::new(Arc::new(EventBus::new(16)));
        assert!(!handler.cancellation_token.is_cancelled());

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
