//! Progress events emitted while a batch runs

use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Processing started for one image
    Started { index: usize, total: usize, id: String },
    Aligned { index: usize, id: String, quality: f64 },
    Skipped { index: usize, id: String, reason: String },
    /// Every input has a terminal outcome
    Finished {
        aligned: usize,
        skipped: usize,
        cancelled: bool,
    },
}

/// Receives progress events. In parallel runs events arrive from worker
/// threads in completion order.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Writes one log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { index, total, id } => {
                info!(index = index, total = total, image = %id, "[{}/{}] {}", index + 1, total, id)
            }
            ProgressEvent::Aligned { id, quality, .. } => {
                info!(image = %id, quality = quality, "aligned (quality {:.3})", quality)
            }
            ProgressEvent::Skipped { id, reason, .. } => {
                info!(image = %id, reason = %reason, "skipped: {}", reason)
            }
            ProgressEvent::Finished {
                aligned,
                skipped,
                cancelled,
            } => info!(
                aligned = aligned,
                skipped = skipped,
                cancelled = cancelled,
                "finished: {} aligned, {} skipped",
                aligned,
                skipped
            ),
        }
    }
}

/// Keeps every event, for inspection after a run.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
