//! Rehydrates a stored graph+weights artifact into a forward-callable
//! network.

use crate::artifact::{Artifact, InputSpec, LayerSpec};
use crate::errors::ModelError;
use crate::layers::Layer;
use crate::registry::LayerRegistry;
use ndarray::{Array4, ArrayD, IxDyn};
use std::collections::HashSet;
use std::path::Path;

/// Hands stored weight tensors out to layer factories, tracking which ones
/// were claimed so leftovers can be reported after the graph is built.
pub struct TensorBank<'a> {
    artifact: &'a Artifact,
    claimed: HashSet<String>,
}

impl<'a> TensorBank<'a> {
    pub fn new(artifact: &'a Artifact) -> Self {
        Self {
            artifact,
            claimed: HashSet::new(),
        }
    }

    /// Decode the named tensor from the blob into an owned array.
    pub fn take(&mut self, name: &str) -> Result<ArrayD<f32>, ModelError> {
        let spec = self
            .artifact
            .manifest
            .tensors
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ModelError::MissingTensor(name.to_string()))?;
        self.claimed.insert(name.to_string());

        let values: Vec<f32> = bytemuck::pod_collect_to_vec(self.artifact.tensor_bytes(spec));
        ArrayD::from_shape_vec(IxDyn(&spec.shape), values).map_err(|_| {
            ModelError::Corrupt(format!("tensor `{name}` data does not match its shape"))
        })
    }

    /// Stored tensors no factory asked for.
    pub fn unclaimed(&self) -> Vec<&str> {
        self.artifact
            .manifest
            .tensors
            .iter()
            .filter(|t| !self.claimed.contains(&t.name))
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// The reconstructed network: an ordered stack of layers sharing one
/// read-only weight set for the process lifetime.
pub struct Network {
    input: InputSpec,
    layers: Vec<Box<dyn Layer>>,
}

impl Network {
    pub fn new(input: InputSpec, layers: Vec<Box<dyn Layer>>) -> Self {
        Self { input, layers }
    }

    /// Deserialize the artifact at `path`, rehydrating every layer through
    /// the registry. Any shape or kind violation aborts the load.
    pub fn load(path: impl AsRef<Path>, registry: &LayerRegistry) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let artifact = Artifact::read(path)?;
        let network = Self::from_artifact(&artifact, registry)?;
        tracing::info!(
            path = %path.display(),
            layers = network.layers.len(),
            "Model loaded"
        );
        Ok(network)
    }

    pub fn from_artifact(artifact: &Artifact, registry: &LayerRegistry) -> Result<Self, ModelError> {
        let mut bank = TensorBank::new(artifact);
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(artifact.manifest.layers.len());
        for spec in &artifact.manifest.layers {
            let layer = registry.build(spec, &artifact.manifest.input, &mut bank)?;
            tracing::debug!(layer = %spec.name, kind = %spec.kind, "Layer reconstructed");
            layers.push(layer);
        }

        for name in bank.unclaimed() {
            tracing::warn!(tensor = %name, "Stored tensor not claimed by any layer");
        }

        Ok(Self {
            input: artifact.manifest.input,
            layers,
        })
    }

    pub fn input(&self) -> InputSpec {
        self.input
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// One forward pass from image tensor to the network's output tensor.
    pub fn forward(&self, images: &Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
        let mut value = images.to_owned().into_dyn();
        for layer in &self.layers {
            value = layer.forward(value)?;
        }
        Ok(value)
    }

    /// Persist the network as a loadable artifact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let layers: Vec<LayerSpec> = self
            .layers
            .iter()
            .map(|layer| LayerSpec {
                name: layer.name().to_string(),
                kind: layer.kind().to_string(),
                config: layer.config(),
            })
            .collect();
        let tensors: Vec<(String, ArrayD<f32>)> = self
            .layers
            .iter()
            .flat_map(|layer| layer.weights())
            .collect();
        Artifact::write(path.as_ref(), self.input, &layers, &tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::PatchEmbedding;
    use crate::registry;
    use ndarray::{Array1, Array2, ArrayD};
    use serde_json::json;

    fn registry_with_patch_embedding() -> LayerRegistry {
        let mut registry = LayerRegistry::new();
        registry.register(PatchEmbedding::KIND, registry::patch_embedding);
        registry
    }

    fn small_input() -> InputSpec {
        InputSpec {
            height: 4,
            width: 4,
            channels: 1,
        }
    }

    fn embedding_layer_spec() -> LayerSpec {
        LayerSpec {
            name: "patch_embedding".to_string(),
            kind: "PatchEmbedding".to_string(),
            config: json!({"patch_size": 2, "embed_dim": 3}),
        }
    }

    fn embedding_tensors(patch_dim: usize) -> Vec<(String, ArrayD<f32>)> {
        vec![
            (
                "patch_embedding/projection/kernel".to_string(),
                Array2::<f32>::from_elem((patch_dim, 3), 0.5).into_dyn(),
            ),
            (
                "patch_embedding/projection/bias".to_string(),
                Array1::<f32>::zeros(3).into_dyn(),
            ),
        ]
    }

    #[test]
    fn loads_and_forwards_a_small_graph() {
        let layers = vec![
            embedding_layer_spec(),
            LayerSpec {
                name: "encoder_pool".to_string(),
                kind: "GlobalAveragePooling1D".to_string(),
                config: json!({}),
            },
        ];
        let bytes =
            Artifact::to_bytes(small_input(), &layers, &embedding_tensors(4)).unwrap();
        let artifact = Artifact::from_bytes(&bytes).unwrap();

        let network =
            Network::from_artifact(&artifact, &registry_with_patch_embedding()).unwrap();
        assert_eq!(network.depth(), 2);

        let images = ndarray::Array4::from_elem((1, 4, 4, 1), 1.0);
        let output = network.forward(&images).unwrap();
        // Every patch sums 4 ones through a 0.5 kernel: each embedding
        // coordinate is 2.0, and so is their mean.
        assert_eq!(output.shape(), &[1, 3]);
        assert_eq!(output[[0, 0]], 2.0);
    }

    #[test]
    fn unknown_layer_kind_aborts_the_load() {
        let layers = vec![LayerSpec {
            name: "mixer".to_string(),
            kind: "SpectralGate".to_string(),
            config: json!({}),
        }];
        let bytes = Artifact::to_bytes(small_input(), &layers, &[]).unwrap();
        let artifact = Artifact::from_bytes(&bytes).unwrap();

        let error = Network::from_artifact(&artifact, &registry_with_patch_embedding())
            .map(|_| ())
            .unwrap_err();
        match error {
            ModelError::UnregisteredLayer(kind) => assert_eq!(kind, "SpectralGate"),
            other => panic!("expected UnregisteredLayer, got {other:?}"),
        }
    }

    #[test]
    fn stored_kernel_must_match_the_configured_shape() {
        // Config implies a patch width of 4 for one channel; store a kernel
        // shaped for two channels instead.
        let bytes = Artifact::to_bytes(
            small_input(),
            &[embedding_layer_spec()],
            &embedding_tensors(8),
        )
        .unwrap();
        let artifact = Artifact::from_bytes(&bytes).unwrap();

        let result = Network::from_artifact(&artifact, &registry_with_patch_embedding());
        assert!(matches!(result, Err(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn missing_weight_tensor_aborts_the_load() {
        let bytes =
            Artifact::to_bytes(small_input(), &[embedding_layer_spec()], &[]).unwrap();
        let artifact = Artifact::from_bytes(&bytes).unwrap();

        let result = Network::from_artifact(&artifact, &registry_with_patch_embedding());
        assert!(matches!(result, Err(ModelError::MissingTensor(_))));
    }

    #[test]
    fn save_then_load_reproduces_identical_output() {
        let bytes = Artifact::to_bytes(
            small_input(),
            &[embedding_layer_spec()],
            &embedding_tensors(4),
        )
        .unwrap();
        let artifact = Artifact::from_bytes(&bytes).unwrap();
        let registry = registry_with_patch_embedding();
        let network = Network::from_artifact(&artifact, &registry).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resaved.nnet");
        network.save(&path).unwrap();
        let reloaded = Network::load(&path, &registry).unwrap();

        let mut images = ndarray::Array4::zeros((1, 4, 4, 1));
        for (i, v) in images.iter_mut().enumerate() {
            *v = (i % 7) as f32 / 7.0;
        }

        let before = network.forward(&images).unwrap();
        let after = reloaded.forward(&images).unwrap();
        assert_eq!(before, after);
    }
}
