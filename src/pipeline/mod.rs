pub mod batch;
pub mod engine;
pub mod progress;
pub mod types;

pub use batch::{BatchOrchestrator, CancellationToken};
pub use engine::{AlignmentEngine, WarpedFace};
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressSink, RecordingProgress};
pub use types::*;
