//! Single-image alignment pipeline
//!
//! `AlignmentEngine` owns the active reference model and every runtime
//! setting. It is handed explicitly to the batch orchestrator, there is no
//! shared global instance.

use super::types::{AlignedImage, AlignmentOutcome, SkipReason, SkipRecord};
use crate::config::{check_output_size, Config, EngineConfig};
use crate::error::{AlignError, AlignResult};
use crate::estimator::{Estimate, TransformEstimator};
use crate::landmarks::{LandmarkExtractor, LandmarkMap};
use crate::logging::{ImageSpan, MetricsCollector, Stage};
use crate::reference::ReferenceModel;
use crate::tilt::{TiltClassifier, TiltVerdict};
use crate::utils::{ImageInput, SourceImage};
use crate::warp::{canvas_size, draw_landmarks, ImageWarper};
use image::RgbImage;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Warped pixels plus the estimate that produced them.
#[derive(Debug, Clone)]
pub struct WarpedFace {
    pub image: RgbImage,
    pub debug_image: Option<RgbImage>,
    pub canvas_size: (u32, u32),
    pub estimate: Estimate,
}

pub struct AlignmentEngine {
    config: EngineConfig,
    estimator: TransformEstimator,
    tilt: TiltClassifier,
    warper: ImageWarper,
    reference: Option<ReferenceModel>,
    extractor: Arc<dyn LandmarkExtractor>,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for AlignmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentEngine")
            .field("config", &self.config)
            .field("extractor", &self.extractor.name())
            .field("reference", &self.reference.as_ref().map(|r| r.source().to_string()))
            .finish()
    }
}

fn configuration_error(errors: Vec<String>) -> AlignError {
    AlignError::ConfigurationError(errors.join("; "))
}

impl AlignmentEngine {
    /// Build an engine from the alignment-related sections of `config`.
    pub fn new(config: &Config, extractor: Arc<dyn LandmarkExtractor>) -> AlignResult<Self> {
        config.engine.validate().map_err(configuration_error)?;
        config.estimator.validate().map_err(configuration_error)?;

        Ok(Self {
            tilt: TiltClassifier::new(config.engine.tilt_threshold_degrees)?,
            config: config.engine.clone(),
            estimator: TransformEstimator::new(config.estimator.clone()),
            warper: ImageWarper::new(&config.warp),
            reference: None,
            extractor,
            metrics: Arc::new(MetricsCollector::default()),
        })
    }

    pub fn with_defaults(extractor: Arc<dyn LandmarkExtractor>) -> Self {
        Self {
            config: EngineConfig::default(),
            estimator: TransformEstimator::default(),
            tilt: TiltClassifier::default(),
            warper: ImageWarper::default(),
            reference: None,
            extractor,
            metrics: Arc::new(MetricsCollector::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &TransformEstimator {
        &self.estimator
    }

    pub fn warper(&self) -> &ImageWarper {
        &self.warper
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn extractor(&self) -> &dyn LandmarkExtractor {
        self.extractor.as_ref()
    }

    pub fn reference(&self) -> Option<&ReferenceModel> {
        self.reference.as_ref()
    }

    /// Drop a synthesized reference so the next use picks up new settings.
    /// A reference taken from an image keeps its landmarks but re-derives its
    /// output size.
    fn invalidate_synthesized(&mut self) {
        if self.reference.as_ref().is_some_and(|r| !r.is_from_image()) {
            self.reference = None;
        }
        self.resize_image_reference();
    }

    fn resize_image_reference(&mut self) {
        let (force, configured) = (self.config.force_reference_size, self.config.output_size);
        if let Some(reference) = self.reference.as_mut() {
            reference.apply_size_policy(force, configured);
        }
    }

    pub fn set_eye_distance_percent(&mut self, percent: f64) -> AlignResult<()> {
        crate::config::check_eye_distance_percent(percent).map_err(AlignError::ConfigurationError)?;
        self.config.eye_distance_percent = percent;
        self.invalidate_synthesized();
        Ok(())
    }

    pub fn set_output_size(&mut self, size: (u32, u32)) -> AlignResult<()> {
        check_output_size(size).map_err(AlignError::ConfigurationError)?;
        self.config.output_size = size;
        self.invalidate_synthesized();
        Ok(())
    }

    pub fn set_tilt_threshold(&mut self, degrees: f64) -> AlignResult<()> {
        self.tilt.set_threshold(degrees)?;
        self.config.tilt_threshold_degrees = degrees;
        Ok(())
    }

    pub fn set_filter_tilted(&mut self, enabled: bool) {
        self.config.filter_tilted = enabled;
    }

    pub fn set_preserve_background(&mut self, enabled: bool) {
        self.config.preserve_background = enabled;
    }

    /// Also applies to an image reference that is already set.
    pub fn set_force_reference_size(&mut self, enabled: bool) {
        self.config.force_reference_size = enabled;
        self.resize_image_reference();
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.config.debug_mode = enabled;
    }

    /// Whether outputs keep the source canvas.
    pub fn keeps_background(&self) -> bool {
        self.config.preserve_background && !self.config.force_reference_size
    }

    /// Replace the reference with a synthesized layout.
    pub fn set_reference_from_percentage(&mut self, percent: f64) -> AlignResult<&ReferenceModel> {
        let model = ReferenceModel::from_percentage(percent, self.config.output_size)?;
        self.config.eye_distance_percent = percent;
        let model = self.reference.insert(model);
        Ok(&*model)
    }

    /// Replace the reference with the landmarks of `input`. Failures here are
    /// fatal for a batch.
    pub fn set_reference_from_image(&mut self, input: &ImageInput) -> AlignResult<&ReferenceModel> {
        let image = input.load()?;
        let model = ReferenceModel::from_image(
            &image,
            self.extractor.as_ref(),
            self.config.force_reference_size,
            self.config.output_size,
        )?;
        let model = self.reference.insert(model);
        Ok(&*model)
    }

    /// Active reference, synthesizing it from the configured percentage on
    /// first use.
    pub fn ensure_reference(&mut self) -> AlignResult<&ReferenceModel> {
        if self.reference.is_none() {
            let model =
                ReferenceModel::from_percentage(self.config.eye_distance_percent, self.config.output_size)?;
            debug!(source = %model.source(), "Lazily synthesized reference");
            self.reference = Some(model);
        }
        self.reference
            .as_ref()
            .ok_or_else(|| AlignError::ConfigurationError("reference model unavailable".to_string()))
    }

    pub fn clear_reference(&mut self) {
        self.reference = None;
    }

    /// The stored reference, or the one `ensure_reference` would build.
    fn active_reference(&self) -> AlignResult<Cow<'_, ReferenceModel>> {
        match &self.reference {
            Some(model) => Ok(Cow::Borrowed(model)),
            None => Ok(Cow::Owned(ReferenceModel::from_percentage(
                self.config.eye_distance_percent,
                self.config.output_size,
            )?)),
        }
    }

    pub fn check_tilt(&self, landmarks: &LandmarkMap) -> TiltVerdict {
        self.tilt.classify(landmarks)
    }

    /// Estimate and warp one decoded image with known landmarks.
    pub fn align_image(
        &self,
        image: &SourceImage,
        landmarks: &LandmarkMap,
        correlation_id: Option<Uuid>,
    ) -> AlignResult<WarpedFace> {
        let reference = self.active_reference()?;
        let output_size = reference.output_size();

        let estimate = self.metrics.time(Stage::Estimate, correlation_id, || {
            self.estimator
                .estimate(landmarks, reference.landmarks(), output_size)
        })?;

        if !estimate.quality.passes_threshold {
            debug!(
                image = %image.id,
                score = estimate.quality.score,
                threshold = self.estimator.config().quality_threshold,
                "Alignment quality below advisory threshold"
            );
        }

        let preserve = self.keeps_background();
        let warped = self.metrics.time(Stage::Warp, correlation_id, || {
            self.warper
                .warp(&image.pixels, &estimate.transform, output_size, preserve)
        })?;

        let debug_image = if self.config.debug_mode {
            let transform = estimate.transform;
            let mapped = landmarks.transformed(|p| transform.apply(p));
            Some(
                self.metrics
                    .time(Stage::Annotate, correlation_id, || draw_landmarks(&warped, &mapped)),
            )
        } else {
            None
        };

        Ok(WarpedFace {
            canvas_size: canvas_size(image.dimensions(), output_size, preserve),
            image: warped,
            debug_image,
            estimate,
        })
    }

    /// Run one input through decode, extract, classify, estimate and warp.
    /// Never fails: every error becomes a skip record.
    pub fn process(&self, index: usize, input: &ImageInput, correlation_id: Option<Uuid>) -> AlignmentOutcome {
        let id = input.id();
        let span = ImageSpan::new(index, &id, correlation_id);
        let _enter = span.enter();

        let skip = |reason: SkipReason, detail: Option<String>| {
            let mut record = SkipRecord::new(index, id.clone(), reason);
            if let Some(detail) = detail {
                record = record.with_detail(detail);
            }
            span.record_outcome(false, &record.message());
            AlignmentOutcome::Skipped(record)
        };

        let source = match self.metrics.time(Stage::Decode, correlation_id, || input.load()) {
            Ok(source) => source,
            Err(e) => return skip(SkipReason::Unreadable, Some(e.to_string())),
        };
        span.record_decoded(source.dimensions());

        let landmarks = match self
            .metrics
            .time(Stage::Extract, correlation_id, || self.extractor.extract(&source))
        {
            Some(landmarks) if landmarks.has_eyes() => landmarks,
            Some(_) => return skip(SkipReason::NoLandmarks, Some("eye centers missing".to_string())),
            None => return skip(SkipReason::NoLandmarks, None),
        };
        span.record_landmarks(landmarks.len());

        let verdict = self
            .metrics
            .time(Stage::Classify, correlation_id, || self.tilt.classify(&landmarks));
        if let Some(angle) = verdict.angle_degrees {
            span.record_tilt(angle);
        }
        if self.config.filter_tilted && !verdict.acceptable {
            return skip(SkipReason::Tilted(verdict.reason.clone()), None);
        }

        match self.align_image(&source, &landmarks, correlation_id) {
            Ok(face) => {
                span.record_transform(&face.estimate.transform, &face.estimate.quality);
                span.record_outcome(true, "aligned");
                AlignmentOutcome::Aligned(AlignedImage {
                    index,
                    file_name: input.file_name(),
                    id: id.clone(),
                    source_size: source.dimensions(),
                    image: face.image,
                    debug_image: face.debug_image,
                    canvas_size: face.canvas_size,
                    tilt_degrees: verdict.angle_degrees,
                    landmarks,
                    estimate: face.estimate,
                })
            }
            Err(e) => {
                warn!(image = %id, error = %e, "Alignment failed");
                skip(SkipReason::ProcessingFailed(e.to_string()), None)
            }
        }
    }

    /// Log the active settings once, at the start of a run.
    pub fn log_settings(&self) {
        info!(
            eye_distance_percent = self.config.eye_distance_percent,
            tilt_threshold_degrees = self.tilt.threshold(),
            filter_tilted = self.config.filter_tilted,
            keeps_background = self.keeps_background(),
            debug_mode = self.config.debug_mode,
            extractor = self.extractor.name(),
            "Alignment engine settings"
        );
    }
}
