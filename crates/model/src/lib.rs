pub mod artifact;
pub mod embedding;
pub mod errors;
pub mod layers;
pub mod loader;
pub mod patch;
pub mod registry;

// Re-export commonly used types for convenience
pub use artifact::{Artifact, InputSpec, LayerSpec, TensorSpec};
pub use embedding::{PatchEmbedding, PatchEmbeddingConfig, PatchProjector, PatchSize};
pub use errors::ModelError;
pub use layers::{Activation, Dense, DenseConfig, Dropout, DropoutConfig, GlobalAveragePooling1D, Layer};
pub use loader::{Network, TensorBank};
pub use registry::LayerRegistry;
