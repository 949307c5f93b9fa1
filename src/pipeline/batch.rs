//! Batch orchestration over an ordered list of inputs
//!
//! Per-image failures never abort a run: every input ends as exactly one
//! aligned image or one skip record, in input order. Only establishing the
//! reference model can fail the batch as a whole.

use super::engine::AlignmentEngine;
use super::progress::{NoopProgress, ProgressEvent, ProgressSink};
use super::types::{AlignmentOutcome, BatchReport, SkipReason, SkipRecord};
use crate::error::AlignResult;
use crate::logging::{self, BatchSpan};
use crate::reference::ReferenceModel;
use crate::utils::ImageInput;
use chrono::Utc;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cooperative cancellation, observed between images.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

pub struct BatchOrchestrator {
    progress: Arc<dyn ProgressSink>,
    cancellation: CancellationToken,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchOrchestrator {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoopProgress),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Handle that cancels this orchestrator's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Set the reference from `reference` if given, otherwise keep the
    /// engine's current one (synthesizing it on first use).
    pub fn establish_reference<'e>(
        &self,
        engine: &'e mut AlignmentEngine,
        reference: Option<&ImageInput>,
    ) -> AlignResult<&'e ReferenceModel> {
        match reference {
            Some(input) => engine.set_reference_from_image(input),
            None => engine.ensure_reference(),
        }
    }

    /// Align every input sequentially, in order.
    pub fn run(
        &self,
        engine: &mut AlignmentEngine,
        inputs: &[ImageInput],
        reference: Option<&ImageInput>,
    ) -> AlignResult<BatchReport> {
        self.run_with(engine, inputs, reference, false)
    }

    /// Align inputs on the rayon pool. The report keeps input order.
    pub fn run_parallel(
        &self,
        engine: &mut AlignmentEngine,
        inputs: &[ImageInput],
        reference: Option<&ImageInput>,
    ) -> AlignResult<BatchReport> {
        self.run_with(engine, inputs, reference, true)
    }

    fn run_with(
        &self,
        engine: &mut AlignmentEngine,
        inputs: &[ImageInput],
        reference: Option<&ImageInput>,
        parallel: bool,
    ) -> AlignResult<BatchReport> {
        let correlation_id = logging::new_correlation_id();
        let batch_span = BatchSpan::new(inputs.len(), parallel, correlation_id);
        let _enter = batch_span.enter();

        let model = self.establish_reference(engine, reference)?;
        batch_span.record_reference(&model.source().to_string(), model.output_size());
        let reference_source = model.source().clone();
        let output_size = model.output_size();

        // read-only from here on
        let engine: &AlignmentEngine = engine;
        engine.metrics().clear();
        engine.log_settings();
        let started_at = Utc::now();
        let total = inputs.len();

        let outcomes: Vec<AlignmentOutcome> = if parallel {
            inputs
                .par_iter()
                .enumerate()
                .map(|(index, input)| self.process_one(engine, index, total, input, correlation_id))
                .collect()
        } else {
            inputs
                .iter()
                .enumerate()
                .map(|(index, input)| self.process_one(engine, index, total, input, correlation_id))
                .collect()
        };

        let cancelled = outcomes
            .iter()
            .any(|o| matches!(o.as_skipped(), Some(s) if s.reason == SkipReason::Cancelled));
        if cancelled {
            warn!("Batch cancelled before every image was processed");
        }

        let report = BatchReport {
            correlation_id,
            reference: reference_source,
            output_size,
            outcomes,
            cancelled,
            stage_stats: engine.metrics().snapshot(Some(correlation_id)),
            started_at,
            finished_at: Utc::now(),
        };

        let aligned = report.success_count();
        let skipped = report.skip_count();
        batch_span.record_completion(aligned, skipped, cancelled);
        self.progress.on_event(ProgressEvent::Finished {
            aligned,
            skipped,
            cancelled,
        });
        info!("{}", report.summary());

        Ok(report)
    }

    fn process_one(
        &self,
        engine: &AlignmentEngine,
        index: usize,
        total: usize,
        input: &ImageInput,
        correlation_id: Uuid,
    ) -> AlignmentOutcome {
        let outcome = if self.cancellation.is_cancelled() {
            AlignmentOutcome::Skipped(SkipRecord::new(index, input.id(), SkipReason::Cancelled))
        } else {
            self.progress.on_event(ProgressEvent::Started {
                index,
                total,
                id: input.id(),
            });
            engine.process(index, input, Some(correlation_id))
        };
        self.emit_outcome(&outcome);
        outcome
    }

    fn emit_outcome(&self, outcome: &AlignmentOutcome) {
        let event = match outcome {
            AlignmentOutcome::Aligned(a) => ProgressEvent::Aligned {
                index: a.index,
                id: a.id.clone(),
                quality: a.estimate.quality.score,
            },
            AlignmentOutcome::Skipped(s) => ProgressEvent::Skipped {
                index: s.index,
                id: s.id.clone(),
                reason: s.message(),
            },
        };
        self.progress.on_event(event);
    }

    /// Re-run one input against the engine's current reference, without
    /// touching the rest of the batch.
    pub fn reprocess(&self, engine: &AlignmentEngine, index: usize, input: &ImageInput) -> AlignmentOutcome {
        let outcome = engine.process(index, input, logging::get_correlation_id());
        self.emit_outcome(&outcome);
        outcome
    }

    /// Re-run one input and swap the result into `report`.
    pub fn reprocess_into(
        &self,
        engine: &AlignmentEngine,
        report: &mut BatchReport,
        index: usize,
        input: &ImageInput,
    ) -> Option<AlignmentOutcome> {
        let outcome = self.reprocess(engine, index, input);
        report.replace_outcome(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkKey, LandmarkMap, ManifestExtractor, Point};
    use crate::pipeline::progress::RecordingProgress;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 200]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn engine() -> AlignmentEngine {
        let face = LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(70.0, 90.0))
            .with(LandmarkKey::RightEye, Point::new(130.0, 90.0))
            .with(LandmarkKey::NoseTip, Point::new(100.0, 120.0));
        let mut manifest = ManifestExtractor::new();
        for id in ["a.png", "b.png", "c.png"] {
            manifest.insert(id, face.clone());
        }
        AlignmentEngine::with_defaults(Arc::new(manifest))
    }

    fn inputs() -> Vec<ImageInput> {
        vec![
            ImageInput::from_bytes("a.png", png(200, 200)),
            ImageInput::from_bytes("b.png", png(200, 200)),
            ImageInput::from_bytes("c.png", png(200, 200)),
        ]
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_cancelled_batch_keeps_partition() {
        let mut engine = engine();
        let orchestrator = BatchOrchestrator::new();
        orchestrator.cancellation_token().cancel();

        let report = orchestrator.run(&mut engine, &inputs(), None).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.skip_count(), 3);
        assert!(report.skips().all(|s| s.message() == "cancelled"));
    }

    #[test]
    fn test_progress_events() {
        let mut engine = engine();
        let sink = Arc::new(RecordingProgress::new());
        let orchestrator = BatchOrchestrator::new().with_progress(sink.clone());

        orchestrator.run(&mut engine, &inputs(), None).unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 7);
        assert!(matches!(events[0], ProgressEvent::Started { index: 0, total: 3, .. }));
        assert!(matches!(events[1], ProgressEvent::Aligned { index: 0, .. }));
        assert!(matches!(
            events[6],
            ProgressEvent::Finished {
                aligned: 3,
                skipped: 0,
                cancelled: false
            }
        ));
    }

    #[test]
    fn test_stage_stats_start_fresh_each_batch() {
        let mut engine = engine();
        let orchestrator = BatchOrchestrator::new();

        orchestrator.run(&mut engine, &inputs(), None).unwrap();
        let report = orchestrator.run(&mut engine, &inputs(), None).unwrap();

        // decode, extract, classify, estimate, warp for each of 3 images
        assert_eq!(engine.metrics().measurement_count(), 15);
        assert!(report.stage_stats.iter().all(|s| s.count == 3));
    }

    #[test]
    fn test_reprocess_replaces_single_outcome() {
        let mut engine = engine();
        let orchestrator = BatchOrchestrator::new();
        let inputs = inputs();
        let mut report = orchestrator.run(&mut engine, &inputs, None).unwrap();

        let replacement = ImageInput::from_bytes("b.png", vec![0xde, 0xad]);
        let previous = orchestrator
            .reprocess_into(&engine, &mut report, 1, &replacement)
            .unwrap();
        assert!(previous.is_aligned());
        assert_eq!(report.outcomes[1].as_skipped().unwrap().message(), "unreadable");
        assert!(report.outcomes[0].is_aligned() && report.outcomes[2].is_aligned());
    }
}
