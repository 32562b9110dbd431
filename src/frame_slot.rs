use crate::frame::RawFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

/// Single-slot hand-off between the capture output and the frame consumer.
///
/// Holds at most one frame. A frame sent while the previous one is still
/// unconsumed replaces it, so the consumer always sees the latest frame and
/// never a backlog.
struct Shared {
    slot: Mutex<Option<RawFrame>>,
    notify: Notify,
    closed: AtomicBool,
    stats: FrameSlotStats,
}

/// Statistics for frame hand-off monitoring
#[derive(Debug, Default)]
pub struct FrameSlotStats {
    /// Total frames sent into the slot
    pub frames_pushed: AtomicU64,
    /// Total frames taken by the consumer
    pub frames_taken: AtomicU64,
    /// Frames replaced before the consumer got to them
    pub frames_overwritten: AtomicU64,
    /// Frames thrown away when the output stopped
    pub frames_discarded: AtomicU64,
}

impl FrameSlotStats {
    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> FrameSlotStatsSnapshot {
        FrameSlotStatsSnapshot {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_taken: self.frames_taken.load(Ordering::Relaxed),
            frames_overwritten: self.frames_overwritten.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of frame slot statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSlotStatsSnapshot {
    pub frames_pushed: u64,
    pub frames_taken: u64,
    pub frames_overwritten: u64,
    pub frames_discarded: u64,
}

/// Producer half, owned by the capture output
#[derive(Clone)]
pub struct FrameSender {
    shared: Arc<Shared>,
}

/// Consumer half, owned by the frame loop
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

/// Create a connected sender/receiver pair
pub fn frame_slot() -> (FrameSender, FrameReceiver) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
        stats: FrameSlotStats::default(),
    });

    (
        FrameSender {
            shared: Arc::clone(&shared),
        },
        FrameReceiver { shared },
    )
}

impl FrameSender {
    /// Offer a frame, replacing any frame the consumer has not taken yet
    pub fn send(&self, frame: RawFrame) {
        let frame_id = frame.id;
        let replaced = self.shared.slot.lock().replace(frame);

        if let Some(stale) = replaced {
            self.shared
                .stats
                .frames_overwritten
                .fetch_add(1, Ordering::Relaxed);
            trace!("Frame {} replaced unconsumed frame {}", frame_id, stale.id);
        }

        self.shared.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.shared.notify.notify_one();
    }

    /// Drop the pending frame, if any, so it is never handed to the consumer
    pub fn clear(&self) {
        if let Some(stale) = self.shared.slot.lock().take() {
            self.shared
                .stats
                .frames_discarded
                .fetch_add(1, Ordering::Relaxed);
            trace!("Discarded pending frame {}", stale.id);
        }
    }

    /// Close the slot; the receiver drains the pending frame and then ends
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    pub fn stats(&self) -> FrameSlotStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl FrameReceiver {
    /// Wait for the next frame. Returns `None` once the slot is closed and empty.
    pub async fn recv(&mut self) -> Option<RawFrame> {
        loop {
            if let Some(frame) = self.try_recv() {
                return Some(frame);
            }

            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }

            self.shared.notify.notified().await;
        }
    }

    /// Take the pending frame without waiting
    pub fn try_recv(&mut self) -> Option<RawFrame> {
        let frame = self.shared.slot.lock().take();
        if frame.is_some() {
            self.shared.stats.frames_taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn stats(&self) -> FrameSlotStatsSnapshot {
        self.shared.stats.snapshot()
    }
}
