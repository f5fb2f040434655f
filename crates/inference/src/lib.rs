pub mod engine;
pub mod report;

// Re-export commonly used types for convenience
pub use engine::{InferenceEngine, InferenceError};
pub use report::{
    build_prediction, Prediction, ScanMetadata, DECISION_THRESHOLD, NEGATIVE_LABEL, POSITIVE_LABEL,
};
