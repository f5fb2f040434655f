use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("artifact manifest is not valid JSON: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("artifact is corrupt: {0}")]
    Corrupt(String),

    #[error("unregistered layer kind `{0}`")]
    UnregisteredLayer(String),

    #[error("invalid configuration for layer `{layer}`: {reason}")]
    InvalidConfig { layer: String, reason: String },

    #[error("missing weight tensor `{0}`")]
    MissingTensor(String),

    #[error("tensor `{name}`: stored shape {stored:?} does not match expected {expected}")]
    ShapeMismatch {
        name: String,
        stored: Vec<usize>,
        expected: String,
    },

    #[error("layer `{layer}` rejected input of shape {shape:?}: {reason}")]
    BadInput {
        layer: String,
        shape: Vec<usize>,
        reason: String,
    },

    #[error("projection of `{0}` used before its weights were bound")]
    Unbound(String),
}
