use crate::errors::ModelError;
use crate::layers::Layer;
use crate::patch::PatchExtractor;
use ndarray::{Array1, Array2, Array3, ArrayD, ArrayView4, Ix4};
use serde::{Deserialize, Serialize};

/// Patch size as persisted in the layer configuration: a single integer for
/// square patches, or an explicit `(height, width)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatchSize {
    Square(usize),
    Rect(usize, usize),
}

impl PatchSize {
    pub fn dims(&self) -> (usize, usize) {
        match *self {
            PatchSize::Square(side) => (side, side),
            PatchSize::Rect(height, width) => (height, width),
        }
    }
}

/// Persisted configuration of the patch-embedding layer. Must match the
/// shape of the projection matrix stored next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchEmbeddingConfig {
    pub patch_size: PatchSize,
    pub embed_dim: usize,
}

impl PatchEmbeddingConfig {
    fn validate(&self) -> Result<(), String> {
        let (patch_h, patch_w) = self.patch_size.dims();
        if patch_h == 0 || patch_w == 0 {
            return Err("patch_size components must be positive".to_string());
        }
        if self.embed_dim == 0 {
            return Err("embed_dim must be positive".to_string());
        }
        Ok(())
    }
}

/// Linear projection of flattened patches to the embedding width.
///
/// The kernel shape depends on the input channel count, which is only known
/// once an input shape is bound: `bind` fixes the patch width, and only then
/// can persisted weights be attached or fresh ones allocated. Weights whose
/// shape disagrees with the bound width are rejected, never reshaped.
#[derive(Debug)]
pub struct PatchProjector {
    name: String,
    embed_dim: usize,
    patch_dim: Option<usize>,
    kernel: Option<Array2<f32>>,
    bias: Option<Array1<f32>>,
}

impl PatchProjector {
    pub fn new(name: impl Into<String>, embed_dim: usize) -> Self {
        Self {
            name: name.into(),
            embed_dim,
            patch_dim: None,
            kernel: None,
            bias: None,
        }
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn patch_dim(&self) -> Option<usize> {
        self.patch_dim
    }

    /// Fix the input width. Idempotent for an equal width; rebinding to a
    /// different one is rejected.
    pub fn bind(&mut self, patch_dim: usize) -> Result<(), ModelError> {
        match self.patch_dim {
            None => {
                self.patch_dim = Some(patch_dim);
                Ok(())
            }
            Some(bound) if bound == patch_dim => Ok(()),
            Some(bound) => Err(ModelError::InvalidConfig {
                layer: self.name.clone(),
                reason: format!("already bound to patch width {bound}, cannot rebind to {patch_dim}"),
            }),
        }
    }

    /// Install persisted weights. The kernel must be exactly
    /// `(patch_dim, embed_dim)` for the bound patch width.
    pub fn attach(&mut self, kernel: Array2<f32>, bias: Array1<f32>) -> Result<(), ModelError> {
        let patch_dim = self
            .patch_dim
            .ok_or_else(|| ModelError::Unbound(self.name.clone()))?;

        if kernel.dim() != (patch_dim, self.embed_dim) {
            return Err(ModelError::ShapeMismatch {
                name: format!("{}/projection/kernel", self.name),
                stored: kernel.shape().to_vec(),
                expected: format!("({patch_dim}, {})", self.embed_dim),
            });
        }
        if bias.len() != self.embed_dim {
            return Err(ModelError::ShapeMismatch {
                name: format!("{}/projection/bias", self.name),
                stored: bias.shape().to_vec(),
                expected: format!("({})", self.embed_dim),
            });
        }

        self.kernel = Some(kernel);
        self.bias = Some(bias);
        Ok(())
    }

    /// Allocate zeroed weights for a freshly configured layer.
    pub fn allocate(&mut self) -> Result<(), ModelError> {
        let patch_dim = self
            .patch_dim
            .ok_or_else(|| ModelError::Unbound(self.name.clone()))?;
        self.kernel = Some(Array2::zeros((patch_dim, self.embed_dim)));
        self.bias = Some(Array1::zeros(self.embed_dim));
        Ok(())
    }

    /// Apply the projection to every patch vector independently:
    /// `(batch, n, patch_dim)` -> `(batch, n, embed_dim)`.
    pub fn project(&self, patches: Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| ModelError::Unbound(self.name.clone()))?;
        let bias = self
            .bias
            .as_ref()
            .ok_or_else(|| ModelError::Unbound(self.name.clone()))?;

        let (batch, patch_count, patch_dim) = patches.dim();
        if Some(patch_dim) != self.patch_dim {
            return Err(ModelError::BadInput {
                layer: self.name.clone(),
                shape: vec![batch, patch_count, patch_dim],
                reason: format!("patch width {patch_dim} differs from bound width {:?}", self.patch_dim),
            });
        }

        let flat = patches
            .into_shape_with_order((batch * patch_count, patch_dim))
            .map_err(|e| ModelError::BadInput {
                layer: self.name.clone(),
                shape: vec![batch, patch_count, patch_dim],
                reason: e.to_string(),
            })?;

        let mut projected = flat.dot(kernel);
        projected += bias;

        projected
            .into_shape_with_order((batch, patch_count, self.embed_dim))
            .map_err(|e| ModelError::BadInput {
                layer: self.name.clone(),
                shape: vec![batch * patch_count, self.embed_dim],
                reason: e.to_string(),
            })
    }

    pub fn weights(&self) -> Option<(&Array2<f32>, &Array1<f32>)> {
        match (&self.kernel, &self.bias) {
            (Some(kernel), Some(bias)) => Some((kernel, bias)),
            _ => None,
        }
    }
}

/// Composite patch-embedding layer: non-overlapping patch extraction
/// followed by a learned linear projection to the embedding width.
///
/// Construction is a two-phase protocol mirroring how the layer was
/// persisted at training time: `configure` records the stored configuration
/// without touching weight memory, `bind` observes the input shape and fixes
/// the patch width, and only then are weights attached or allocated.
pub struct PatchEmbedding {
    name: String,
    config: PatchEmbeddingConfig,
    extractor: PatchExtractor,
    projector: PatchProjector,
}

impl PatchEmbedding {
    pub const KIND: &'static str = "PatchEmbedding";

    pub fn configure(
        name: impl Into<String>,
        config: PatchEmbeddingConfig,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        config.validate().map_err(|reason| ModelError::InvalidConfig {
            layer: name.clone(),
            reason,
        })?;
        let (patch_h, patch_w) = config.patch_size.dims();
        Ok(Self {
            extractor: PatchExtractor::new(patch_h, patch_w),
            projector: PatchProjector::new(name.clone(), config.embed_dim),
            name,
            config,
        })
    }

    /// Observe the expected input shape `(height, width, channels)` and fix
    /// the flattened patch width. Returns the computed width.
    pub fn bind(&mut self, input: [usize; 3]) -> Result<usize, ModelError> {
        let (patch_h, patch_w) = self.config.patch_size.dims();
        let patch_dim = patch_h * patch_w * input[2];
        self.projector.bind(patch_dim)?;
        Ok(patch_dim)
    }

    pub fn attach(&mut self, kernel: Array2<f32>, bias: Array1<f32>) -> Result<(), ModelError> {
        self.projector.attach(kernel, bias)
    }

    pub fn allocate(&mut self) -> Result<(), ModelError> {
        self.projector.allocate()
    }

    /// Extract patches and project them: `(batch, height, width, channels)`
    /// -> `(batch, n, embed_dim)`.
    pub fn embed(&self, images: &ArrayView4<f32>) -> Result<Array3<f32>, ModelError> {
        let sequence = self.extractor.sequence(images);
        self.projector.project(sequence)
    }
}

impl Layer for PatchEmbedding {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    fn forward(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>, ModelError> {
        let shape = input.shape().to_vec();
        let images = input
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| ModelError::BadInput {
                layer: self.name.clone(),
                shape,
                reason: "expected (batch, height, width, channels)".to_string(),
            })?;
        Ok(self.embed(&images)?.into_dyn())
    }

    fn weights(&self) -> Vec<(String, ArrayD<f32>)> {
        match self.projector.weights() {
            Some((kernel, bias)) => vec![
                (
                    format!("{}/projection/kernel", self.name),
                    kernel.clone().into_dyn(),
                ),
                (
                    format!("{}/projection/bias", self.name),
                    bias.clone().into_dyn(),
                ),
            ],
            None => Vec::new(),
        }
    }
}
