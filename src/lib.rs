pub mod config;
pub mod error;
pub mod estimator;
pub mod landmarks;
pub mod logging;
pub mod pipeline;
pub mod reference;
pub mod tilt;
pub mod utils;
pub mod warp;

pub use config::{load_config, Config};
pub use error::{AlignError, AlignResult};
pub use estimator::{Estimate, QualityScore, SimilarityTransform, TransformEstimator};
pub use landmarks::{LandmarkExtractor, LandmarkKey, LandmarkMap, ManifestExtractor, Point};
pub use pipeline::{AlignmentEngine, AlignmentOutcome, BatchOrchestrator, BatchReport, SkipReason};
pub use reference::ReferenceModel;
pub use tilt::{TiltClassifier, TiltVerdict};
pub use utils::{ImageInput, SourceImage};
pub use warp::ImageWarper;

pub type Result<T> = anyhow::Result<T>;
