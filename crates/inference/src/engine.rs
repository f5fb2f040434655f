use model::{ModelError, Network};
use ndarray::Array4;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("forward pass produced {len} values, expected a single scalar")]
    NotScalar { len: usize },

    #[error("forward pass produced a non-finite probability ({value})")]
    NonFinite { value: f32 },

    #[error("forward pass produced probability {value} outside [0, 1]")]
    OutOfRange { value: f32 },
}

/// Wraps the loaded network for serving.
///
/// The network is read-only after construction, so concurrent requests can
/// share one engine without locking.
pub struct InferenceEngine {
    network: Network,
}

impl InferenceEngine {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// One forward pass: preprocessed image tensor in, scalar probability
    /// out. No retries; a failed pass is reported as-is.
    pub fn predict(&self, images: &Array4<f32>) -> Result<f32, InferenceError> {
        let output = self.network.forward(images)?;

        let value = match output.iter().next() {
            Some(&value) if output.len() == 1 => value,
            _ => return Err(InferenceError::NotScalar { len: output.len() }),
        };

        if !value.is_finite() {
            return Err(InferenceError::NonFinite { value });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(InferenceError::OutOfRange { value });
        }

        tracing::debug!(probability = value, "Forward pass complete");
        Ok(value)
    }
}
