use crate::error::AlignError;
use crate::estimator::Estimate;
use crate::landmarks::LandmarkMap;
use crate::logging::PerformanceStats;
use crate::reference::ReferenceSource;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Why an image produced no aligned output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Unreadable,
    NoLandmarks,
    Tilted(String),
    ProcessingFailed(String),
    /// The batch was cancelled before this image started
    Cancelled,
}

impl SkipReason {
    /// Map a per-image failure onto the stage it belongs to.
    pub fn from_error(error: &AlignError) -> Self {
        match error {
            AlignError::ImageUnreadable(_) | AlignError::Image(_) => SkipReason::Unreadable,
            AlignError::NoFaceDetected(_) => SkipReason::NoLandmarks,
            AlignError::HeadTilted { .. } => SkipReason::Tilted(error.to_string()),
            AlignError::Cancelled => SkipReason::Cancelled,
            other => SkipReason::ProcessingFailed(other.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable => f.write_str("unreadable"),
            SkipReason::NoLandmarks => f.write_str("no landmarks"),
            SkipReason::Tilted(reason) => write!(f, "tilted: {}", reason),
            SkipReason::ProcessingFailed(error) => write!(f, "processing failed: {}", error),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipRecord {
    pub index: usize,
    pub id: String,
    pub reason: SkipReason,
    /// Underlying error text, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SkipRecord {
    pub fn new(index: usize, id: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            index,
            id: id.into(),
            reason,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Human-readable reason, e.g. `"tilted: 7.3° exceeds 5° threshold"`.
    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignedImage {
    pub index: usize,
    pub id: String,
    /// File name the output is derived from
    pub file_name: String,
    #[serde(skip)]
    pub image: RgbImage,
    /// Annotated copy, present in debug mode
    #[serde(skip)]
    pub debug_image: Option<RgbImage>,
    pub source_size: (u32, u32),
    pub canvas_size: (u32, u32),
    pub tilt_degrees: Option<f64>,
    pub landmarks: LandmarkMap,
    pub estimate: Estimate,
}

/// Terminal state of one input. Every input gets exactly one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlignmentOutcome {
    Aligned(AlignedImage),
    Skipped(SkipRecord),
}

impl AlignmentOutcome {
    pub fn index(&self) -> usize {
        match self {
            AlignmentOutcome::Aligned(a) => a.index,
            AlignmentOutcome::Skipped(s) => s.index,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AlignmentOutcome::Aligned(a) => &a.id,
            AlignmentOutcome::Skipped(s) => &s.id,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignmentOutcome::Aligned(_))
    }

    pub fn as_aligned(&self) -> Option<&AlignedImage> {
        match self {
            AlignmentOutcome::Aligned(a) => Some(a),
            AlignmentOutcome::Skipped(_) => None,
        }
    }

    pub fn as_skipped(&self) -> Option<&SkipRecord> {
        match self {
            AlignmentOutcome::Aligned(_) => None,
            AlignmentOutcome::Skipped(s) => Some(s),
        }
    }
}

/// Ordered outcomes of one batch, one per input.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub correlation_id: Uuid,
    pub reference: ReferenceSource,
    pub output_size: (u32, u32),
    pub outcomes: Vec<AlignmentOutcome>,
    pub cancelled: bool,
    /// Per-stage timings of this batch. The collector is cleared when a batch
    /// starts and keeps at most `MAX_MEASUREMENTS`, so batches above roughly
    /// 1600 images only cover their most recent images.
    pub stage_stats: Vec<PerformanceStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &AlignedImage> + '_ {
        self.outcomes.iter().filter_map(AlignmentOutcome::as_aligned)
    }

    pub fn skips(&self) -> impl Iterator<Item = &SkipRecord> + '_ {
        self.outcomes.iter().filter_map(AlignmentOutcome::as_skipped)
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn skip_count(&self) -> usize {
        self.skips().count()
    }

    /// Swap in a re-processed outcome, returning the previous one.
    pub fn replace_outcome(&mut self, outcome: AlignmentOutcome) -> Option<AlignmentOutcome> {
        let slot = self.outcomes.get_mut(outcome.index())?;
        Some(std::mem::replace(slot, outcome))
    }

    pub fn mean_quality(&self) -> Option<f64> {
        let scores: Vec<f64> = self.successes().map(|a| a.estimate.quality.score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} of {} images aligned, {} skipped",
            self.success_count(),
            self.len(),
            self.skip_count()
        );
        if let Some(quality) = self.mean_quality() {
            summary.push_str(&format!(" (mean quality {:.3})", quality));
        }
        if self.cancelled {
            summary.push_str(", cancelled");
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_text() {
        assert_eq!(SkipReason::Unreadable.to_string(), "unreadable");
        assert_eq!(SkipReason::NoLandmarks.to_string(), "no landmarks");
        assert_eq!(
            SkipReason::Tilted("7.3° exceeds 5° threshold".into()).to_string(),
            "tilted: 7.3° exceeds 5° threshold"
        );
        assert!(SkipReason::ProcessingFailed("degenerate".into())
            .to_string()
            .starts_with("processing failed: "));
    }

    #[test]
    fn test_reason_from_error() {
        assert_eq!(
            SkipReason::from_error(&AlignError::ImageUnreadable("x".into())),
            SkipReason::Unreadable
        );
        assert_eq!(
            SkipReason::from_error(&AlignError::NoFaceDetected("x".into())),
            SkipReason::NoLandmarks
        );
        assert!(matches!(
            SkipReason::from_error(&AlignError::DegenerateGeometry("eyes".into())),
            SkipReason::ProcessingFailed(_)
        ));
    }

    #[test]
    fn test_report_partition() {
        let now = Utc::now();
        let mut report = BatchReport {
            correlation_id: Uuid::new_v4(),
            reference: ReferenceSource::Synthesized {
                eye_distance_percent: 30.0,
            },
            output_size: (512, 512),
            outcomes: vec![
                AlignmentOutcome::Skipped(SkipRecord::new(0, "a", SkipReason::Unreadable)),
                AlignmentOutcome::Skipped(SkipRecord::new(1, "b", SkipReason::NoLandmarks)),
            ],
            cancelled: false,
            stage_stats: Vec::new(),
            started_at: now,
            finished_at: now,
        };

        assert_eq!(report.success_count() + report.skip_count(), report.len());
        assert!(report.mean_quality().is_none());

        let previous = report
            .replace_outcome(AlignmentOutcome::Skipped(SkipRecord::new(1, "b", SkipReason::Cancelled)))
            .unwrap();
        assert_eq!(previous.as_skipped().unwrap().reason, SkipReason::NoLandmarks);
        assert!(report
            .replace_outcome(AlignmentOutcome::Skipped(SkipRecord::new(9, "z", SkipReason::Cancelled)))
            .is_none());
        assert_eq!(report.summary(), "0 of 2 images aligned, 2 skipped");
    }
}
