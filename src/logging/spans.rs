//! Structured spans for batch and per-image logging
//!
//! Fields are declared empty up front and filled in as the pipeline
//! progresses, so they show up on the span in the JSON output.

use crate::estimator::{QualityScore, SimilarityTransform};
use std::time::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

/// Span covering one batch run
pub struct BatchSpan {
    span: Span,
    start_time: Instant,
}

impl BatchSpan {
    pub fn new(total_images: usize, parallel: bool, correlation_id: Uuid) -> Self {
        let span = span!(
            Level::INFO,
            "batch",
            total_images = total_images,
            parallel = parallel,
            correlation_id = %correlation_id,
            aligned = field::Empty,
            skipped = field::Empty,
            cancelled = field::Empty,
            execution_time_ms = field::Empty
        );

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Record reference model establishment
    pub fn record_reference(&self, source: &str, output_size: (u32, u32)) {
        tracing::info!(
            parent: &self.span,
            reference = source,
            output_width = output_size.0,
            output_height = output_size.1,
            "Reference model established"
        );
    }

    pub fn record_completion(&self, aligned: usize, skipped: usize, cancelled: bool) {
        let duration = self.start_time.elapsed();
        self.span.record("aligned", aligned);
        self.span.record("skipped", skipped);
        self.span.record("cancelled", cancelled);
        self.span.record("execution_time_ms", duration.as_millis() as u64);

        tracing::info!(
            parent: &self.span,
            aligned = aligned,
            skipped = skipped,
            cancelled = cancelled,
            execution_time_ms = duration.as_millis() as u64,
            "Batch completed"
        );
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span for one image travelling through the pipeline
pub struct ImageSpan {
    span: Span,
    start_time: Instant,
}

impl ImageSpan {
    pub fn new(index: usize, image_id: &str, correlation_id: Option<Uuid>) -> Self {
        let span = span!(
            Level::DEBUG,
            "align_image",
            index = index,
            image = image_id,
            correlation_id = field::Empty,
            width = field::Empty,
            height = field::Empty,
            landmarks = field::Empty,
            tilt_degrees = field::Empty,
            scale = field::Empty,
            rotation_degrees = field::Empty,
            quality = field::Empty,
            outcome = field::Empty
        );

        if let Some(id) = correlation_id {
            span.record("correlation_id", field::display(id));
        }

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn record_decoded(&self, dimensions: (u32, u32)) {
        self.span.record("width", dimensions.0);
        self.span.record("height", dimensions.1);
    }

    pub fn record_landmarks(&self, count: usize) {
        self.span.record("landmarks", count);
        tracing::trace!(parent: &self.span, landmarks = count, "Landmarks extracted");
    }

    pub fn record_tilt(&self, angle_degrees: f64) {
        self.span.record("tilt_degrees", angle_degrees);
    }

    pub fn record_transform(&self, transform: &SimilarityTransform, quality: &QualityScore) {
        self.span.record("scale", transform.scale());
        self.span.record("rotation_degrees", transform.rotation_degrees());
        self.span.record("quality", quality.score);

        tracing::debug!(
            parent: &self.span,
            translation = %format!("({:.2}, {:.2})", transform.tx(), transform.ty()),
            rotation = %format!("{:.2}°", transform.rotation_degrees()),
            scale = %format!("{:.3}x", transform.scale()),
            mean_error_px = %format!("{:.2}", quality.mean_error_px),
            quality = %format!("{:.3}", quality.score),
            "Similarity transform estimated"
        );
    }

    /// Record the terminal state of this image
    pub fn record_outcome(&self, aligned: bool, description: &str) {
        let duration = self.start_time.elapsed();
        let outcome = if aligned { "aligned" } else { "skipped" };
        self.span.record("outcome", outcome);

        if aligned {
            tracing::info!(
                parent: &self.span,
                execution_time_ms = duration.as_millis() as u64,
                "Image aligned"
            );
        } else {
            tracing::warn!(
                parent: &self.span,
                reason = description,
                execution_time_ms = duration.as_millis() as u64,
                "Image skipped"
            );
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}
