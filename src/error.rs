use thiserror::Error;

/// Failures produced by the alignment engine.
///
/// Per-image variants are converted into skip records by the batch
/// orchestrator. `ConfigurationError` and failures while establishing the
/// reference model are returned to the caller.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("image unreadable: {0}")]
    ImageUnreadable(String),

    #[error("no face detected in {0}")]
    NoFaceDetected(String),

    #[error("head tilted {angle_degrees:.1}° exceeds threshold {threshold_degrees}°")]
    HeadTilted {
        angle_degrees: f64,
        threshold_degrees: f64,
    },

    #[error("insufficient landmarks: {0}")]
    InsufficientLandmarks(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("batch cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

impl AlignError {
    /// Whether a batch may skip the offending image and keep going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AlignError::ConfigurationError(_))
    }
}

pub type AlignResult<T> = std::result::Result<T, AlignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_fatal() {
        assert!(!AlignError::ConfigurationError("bad".into()).is_recoverable());
        assert!(AlignError::NoFaceDetected("a.jpg".into()).is_recoverable());
        assert!(AlignError::DegenerateGeometry("eyes overlap".into()).is_recoverable());
    }

    #[test]
    fn test_tilt_message_formats_angle() {
        let err = AlignError::HeadTilted {
            angle_degrees: 7.26,
            threshold_degrees: 5.0,
        };
        assert_eq!(err.to_string(), "head tilted 7.3° exceeds threshold 5°");
    }
}
