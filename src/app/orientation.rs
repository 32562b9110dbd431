use crate::camera::CaptureDeviceRegistry;
use crate::frame::DeviceOrientation;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Source of physical device orientation changes
pub trait OrientationSource: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<DeviceOrientation>;

    /// Ask the platform to start generating orientation notifications
    fn begin_notifications(&self);

    /// Release a subscription taken with [`begin_notifications`](Self::begin_notifications)
    fn end_notifications(&self);
}

/// Orientation source driven by hand, used by the binary and by tests
pub struct FixedOrientation {
    sender: watch::Sender<DeviceOrientation>,
    subscribers: AtomicU32,
}

impl FixedOrientation {
    pub fn new(initial: DeviceOrientation) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender,
            subscribers: AtomicU32::new(0),
        }
    }

    pub fn set(&self, orientation: DeviceOrientation) {
        self.sender.send_replace(orientation);
    }

    /// Whether anyone currently holds a notification subscription
    pub fn is_generating_notifications(&self) -> bool {
        self.subscribers.load(Ordering::SeqCst) > 0
    }
}

impl Default for FixedOrientation {
    fn default() -> Self {
        Self::new(DeviceOrientation::Portrait)
    }
}

impl OrientationSource for FixedOrientation {
    fn subscribe(&self) -> watch::Receiver<DeviceOrientation> {
        self.sender.subscribe()
    }

    fn begin_notifications(&self) {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
    }

    fn end_notifications(&self) {
        let _ = self
            .subscribers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

/// Follows device orientation while capture runs and feeds the preview
/// orientation back into the session config.
pub struct OrientationMonitor {
    source: Arc<dyn OrientationSource>,
    settle: Duration,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl OrientationMonitor {
    pub fn new(source: Arc<dyn OrientationSource>, settle: Duration) -> Self {
        Self {
            source,
            settle,
            task: Mutex::new(None),
        }
    }

    /// Start observing. Does nothing if already running.
    pub fn start(&self, registry: Arc<CaptureDeviceRegistry>) {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Orientation monitor already running");
            return;
        }

        self.source.begin_notifications();
        let token = CancellationToken::new();
        let source = Arc::clone(&self.source);
        let handle = tokio::spawn(Self::observe(source, registry, self.settle, token.clone()));
        *task = Some((token, handle));
        info!("Orientation monitor started");
    }

    /// Cancel the observation loop and wait for it to release its subscription
    pub async fn stop(&self) {
        let Some((token, handle)) = self.task.lock().take() else {
            return;
        };

        token.cancel();
        if let Err(e) = handle.await {
            warn!("Orientation monitor task failed: {}", e);
        }
        info!("Orientation monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    async fn observe(
        source: Arc<dyn OrientationSource>,
        registry: Arc<CaptureDeviceRegistry>,
        settle: Duration,
        token: CancellationToken,
    ) {
        let mut orientations = source.subscribe();

        let initial = *orientations.borrow_and_update();
        Self::apply(&registry, initial);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = orientations.changed() => {
                    if changed.is_err() {
                        debug!("Orientation source closed");
                        break;
                    }
                }
            }

            // Let the device come to rest before relaying out
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(settle) => {}
            }

            let orientation = *orientations.borrow_and_update();
            Self::apply(&registry, orientation);
        }

        source.end_notifications();
        debug!("Orientation observation ended");
    }

    fn apply(registry: &CaptureDeviceRegistry, orientation: DeviceOrientation) {
        match orientation.video_orientation() {
            Some(video) => {
                let config = registry.set_preview_orientation(video);
                debug!("Preview orientation now {:?}", config.preview_orientation);
            }
            None => trace!("Keeping preview orientation for {:?}", orientation),
        }
    }
}
