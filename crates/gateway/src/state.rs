use crate::upload::UploadStore;
use inference::InferenceEngine;
use preprocess::ImagePreprocessor;
use std::sync::Arc;

/// Shared, read-only application context: built once at startup after the
/// model has loaded, cloned into every request handler. Nothing here is
/// mutated after construction.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub preprocessor: Arc<ImagePreprocessor>,
    pub uploads: Arc<UploadStore>,
}
