//! Landmark-driven similarity transform estimation
//!
//! Scale and rotation always come from the eye pair, which is the most stable
//! pair under changes of expression. The translation pins the eye midpoint onto
//! the reference eye midpoint, and the nose tip is only allowed to nudge it.

pub mod transform;

use crate::config::EstimatorConfig;
use crate::error::{AlignError, AlignResult};
use crate::landmarks::{LandmarkKey, LandmarkMap, Point};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, trace};

pub use transform::SimilarityTransform;

const MIN_EYE_DISTANCE_PX: f64 = 1e-6;

/// Landmarks further than this from the origin cannot belong to any decodable
/// image and are treated as detector garbage.
pub const MAX_COORDINATE_PX: f64 = 1e6;

/// Points scored by the quality metric.
const QUALITY_KEYS: [LandmarkKey; 3] = LandmarkKey::MANDATORY;

/// Advisory alignment quality, never used to reject an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// In [0, 1], 1 means every scored point landed exactly on the reference
    pub score: f64,
    pub mean_error_px: f64,
    /// Error that maps to a score of zero
    pub max_error_px: f64,
    pub points_used: usize,
    pub passes_threshold: bool,
}

/// Result of estimating one source-to-reference mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    pub transform: SimilarityTransform,
    /// Keys present in both maps that took part in matching
    pub correspondences: Vec<LandmarkKey>,
    /// Residual at the secondary point before any nudge
    pub secondary_residual_px: Option<f64>,
    pub refined: bool,
    /// Scale or rotation hit the configured bounds
    pub clamped: bool,
    pub quality: QualityScore,
}

/// Wrap an angle into (-π, π].
fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Every point used for matching must be finite and within
/// [`MAX_COORDINATE_PX`] of the origin.
fn check_coordinates(map: &LandmarkMap, keys: &[LandmarkKey], side: &str) -> AlignResult<()> {
    for key in keys {
        if let Some(p) = map.get(*key) {
            if !p.x.is_finite()
                || !p.y.is_finite()
                || p.x.abs() > MAX_COORDINATE_PX
                || p.y.abs() > MAX_COORDINATE_PX
            {
                return Err(AlignError::DegenerateGeometry(format!(
                    "{} '{}' at ({}, {}) is out of range",
                    side, key, p.x, p.y
                )));
            }
        }
    }
    Ok(())
}

fn points_to_array(points: &[Point]) -> Array2<f64> {
    let mut array = Array2::zeros((points.len(), 2));
    for (mut row, p) in array.outer_iter_mut().zip(points) {
        row[0] = p.x;
        row[1] = p.y;
    }
    array
}

/// Closed-form eye-pair similarity estimator with damped nose refinement.
#[derive(Debug, Clone, Default)]
pub struct TransformEstimator {
    config: EstimatorConfig,
}

impl TransformEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Keys usable for matching. Falls back to the mandatory triple when
    /// fewer than two known keys are shared.
    pub fn correspondences(
        &self,
        source: &LandmarkMap,
        reference: &LandmarkMap,
    ) -> AlignResult<Vec<LandmarkKey>> {
        let common: Vec<LandmarkKey> = source.keys().filter(|k| reference.contains(*k)).collect();
        if common.len() >= 2 {
            return Ok(common);
        }

        let missing: Vec<String> = LandmarkKey::MANDATORY
            .iter()
            .filter(|k| !source.contains(**k) || !reference.contains(**k))
            .map(|k| k.to_string())
            .collect();
        if missing.is_empty() {
            Ok(LandmarkKey::MANDATORY.to_vec())
        } else {
            Err(AlignError::InsufficientLandmarks(format!(
                "fewer than 2 shared points and missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Estimate the mapping from `source` onto `reference`.
    ///
    /// `output_size` only feeds the normalization of the quality score.
    pub fn estimate(
        &self,
        source: &LandmarkMap,
        reference: &LandmarkMap,
        output_size: (u32, u32),
    ) -> AlignResult<Estimate> {
        let correspondences = self.correspondences(source, reference)?;
        check_coordinates(source, &correspondences, "source")?;
        check_coordinates(reference, &correspondences, "reference")?;

        let (src_left, src_right) = source.eyes().ok_or_else(|| {
            AlignError::InsufficientLandmarks("source lacks an eye center".to_string())
        })?;
        let (dst_left, dst_right) = reference.eyes().ok_or_else(|| {
            AlignError::InsufficientLandmarks("reference lacks an eye center".to_string())
        })?;

        let src_vec = src_right - src_left;
        let dst_vec = dst_right - dst_left;
        let src_distance = src_vec.norm();
        let dst_distance = dst_vec.norm();

        if !src_distance.is_finite() || src_distance < MIN_EYE_DISTANCE_PX {
            return Err(AlignError::DegenerateGeometry(
                "source eye centers coincide".to_string(),
            ));
        }
        if !dst_distance.is_finite() || dst_distance < MIN_EYE_DISTANCE_PX {
            return Err(AlignError::DegenerateGeometry(
                "reference eye centers coincide".to_string(),
            ));
        }

        let raw_scale = dst_distance / src_distance;
        let raw_rotation = normalize_angle(dst_vec.y.atan2(dst_vec.x) - src_vec.y.atan2(src_vec.x));

        let max_rotation = self.config.max_rotation_degrees.to_radians();
        let scale = raw_scale.clamp(self.config.min_scale, self.config.max_scale);
        let rotation = raw_rotation.clamp(-max_rotation, max_rotation);
        let clamped = scale != raw_scale || rotation != raw_rotation;
        if clamped {
            debug!(
                raw_scale = raw_scale,
                raw_rotation_degrees = raw_rotation.to_degrees(),
                scale = scale,
                rotation_degrees = rotation.to_degrees(),
                "Clamped eye-pair transform"
            );
        }

        let src_mid = src_left.midpoint(&src_right);
        let dst_mid = dst_left.midpoint(&dst_right);
        let mut transform = SimilarityTransform::anchored(scale, rotation, src_mid, dst_mid);

        let (refined_transform, secondary_residual_px, refined) =
            self.refine(transform, source, reference, &correspondences);
        transform = refined_transform;

        let quality = self.quality(&transform, source, reference, output_size);
        trace!(
            correspondences = correspondences.len(),
            score = quality.score,
            mean_error_px = quality.mean_error_px,
            "Estimate complete"
        );

        Ok(Estimate {
            transform,
            correspondences,
            secondary_residual_px,
            refined,
            clamped,
            quality,
        })
    }

    /// Nudge the translation toward the secondary point when its residual
    /// exceeds the tolerance. The nudge is a fraction of the residual and
    /// never moves the eye midpoint by more than the tolerance.
    fn refine(
        &self,
        transform: SimilarityTransform,
        source: &LandmarkMap,
        reference: &LandmarkMap,
        correspondences: &[LandmarkKey],
    ) -> (SimilarityTransform, Option<f64>, bool) {
        let secondary = [LandmarkKey::NoseTip, LandmarkKey::Nose]
            .into_iter()
            .find(|k| correspondences.contains(k));

        let Some(key) = secondary else {
            return (transform, None, false);
        };
        let (Some(src), Some(dst)) = (source.get(key), reference.get(key)) else {
            return (transform, None, false);
        };

        let residual = dst - transform.apply(src);
        let residual_px = residual.norm();
        if residual_px <= self.config.alignment_tolerance {
            return (transform, Some(residual_px), false);
        }

        let mut nudge = residual * self.config.correction_factor;
        let nudge_px = nudge.norm();
        if nudge_px > self.config.alignment_tolerance {
            nudge = nudge * (self.config.alignment_tolerance / nudge_px);
        }

        debug!(
            secondary = %key,
            residual_px = residual_px,
            nudge_x = nudge.x,
            nudge_y = nudge.y,
            "Refining translation with secondary point"
        );
        (transform.translated(nudge.x, nudge.y), Some(residual_px), true)
    }

    fn quality(
        &self,
        transform: &SimilarityTransform,
        source: &LandmarkMap,
        reference: &LandmarkMap,
        output_size: (u32, u32),
    ) -> QualityScore {
        let (src, dst): (Vec<Point>, Vec<Point>) = QUALITY_KEYS
            .iter()
            .filter_map(|k| Some((source.get(*k)?, reference.get(*k)?)))
            .unzip();

        let diagonal = (output_size.0 as f64).hypot(output_size.1 as f64);
        let max_error_px = self
            .config
            .min_error_px
            .max(diagonal * self.config.error_diagonal_fraction);

        if src.is_empty() {
            return QualityScore {
                score: 0.0,
                mean_error_px: f64::NAN,
                max_error_px,
                points_used: 0,
                passes_threshold: false,
            };
        }

        let mapped = transform.apply_many(&points_to_array(&src));
        let errors = (mapped - points_to_array(&dst)).map_axis(Axis(1), |row| row.dot(&row).sqrt());
        let mean_error_px = errors.mean().unwrap_or(f64::NAN);

        let score = ((max_error_px - mean_error_px) / max_error_px).clamp(0.0, 1.0);
        QualityScore {
            score,
            mean_error_px,
            max_error_px,
            points_used: src.len(),
            passes_threshold: score >= self.config.quality_threshold,
        }
    }
}
