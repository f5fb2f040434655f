use crate::artifact::{InputSpec, LayerSpec};
use crate::embedding::{PatchEmbedding, PatchEmbeddingConfig};
use crate::errors::ModelError;
use crate::layers::{Dense, DenseConfig, Dropout, DropoutConfig, GlobalAveragePooling1D, Layer};
use crate::loader::TensorBank;
use ndarray::{Array1, Array2, Ix1, Ix2};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Rebuilds one layer kind from its persisted spec and stored weights.
pub type LayerFactory =
    fn(&LayerSpec, &InputSpec, &mut TensorBank) -> Result<Box<dyn Layer>, ModelError>;

/// Maps layer-kind tags to reconstruction factories.
///
/// The generic kinds the loader understands on its own (Dense,
/// GlobalAveragePooling1D, Dropout) are always present. Custom kinds are
/// registered explicitly before loading; an artifact naming a kind with no
/// factory fails to load rather than being skipped.
pub struct LayerRegistry {
    factories: HashMap<&'static str, LayerFactory>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(Dense::KIND, dense);
        registry.register(GlobalAveragePooling1D::KIND, global_average_pooling);
        registry.register(Dropout::KIND, dropout);
        registry
    }

    pub fn register(&mut self, kind: &'static str, factory: LayerFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn build(
        &self,
        spec: &LayerSpec,
        input: &InputSpec,
        bank: &mut TensorBank,
    ) -> Result<Box<dyn Layer>, ModelError> {
        let factory = self
            .factories
            .get(spec.kind.as_str())
            .ok_or_else(|| ModelError::UnregisteredLayer(spec.kind.clone()))?;
        factory(spec, input, bank)
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for the custom patch-embedding layer. Registered by the serving
/// binary under [`PatchEmbedding::KIND`], next to the generic kinds.
pub fn patch_embedding(
    spec: &LayerSpec,
    input: &InputSpec,
    bank: &mut TensorBank,
) -> Result<Box<dyn Layer>, ModelError> {
    let config: PatchEmbeddingConfig = parse_config(spec)?;
    let mut layer = PatchEmbedding::configure(&spec.name, config)?;
    layer.bind([input.height, input.width, input.channels])?;

    let kernel = take_matrix(bank, &format!("{}/projection/kernel", spec.name))?;
    let bias = take_vector(bank, &format!("{}/projection/bias", spec.name))?;
    layer.attach(kernel, bias)?;
    Ok(Box::new(layer))
}

fn dense(
    spec: &LayerSpec,
    _input: &InputSpec,
    bank: &mut TensorBank,
) -> Result<Box<dyn Layer>, ModelError> {
    let config: DenseConfig = parse_config(spec)?;
    let kernel = take_matrix(bank, &format!("{}/kernel", spec.name))?;
    let bias = take_vector(bank, &format!("{}/bias", spec.name))?;
    Ok(Box::new(Dense::new(&spec.name, config, kernel, bias)?))
}

fn global_average_pooling(
    spec: &LayerSpec,
    _input: &InputSpec,
    _bank: &mut TensorBank,
) -> Result<Box<dyn Layer>, ModelError> {
    Ok(Box::new(GlobalAveragePooling1D::new(&spec.name)))
}

fn dropout(
    spec: &LayerSpec,
    _input: &InputSpec,
    _bank: &mut TensorBank,
) -> Result<Box<dyn Layer>, ModelError> {
    let config: DropoutConfig = parse_config(spec)?;
    Ok(Box::new(Dropout::new(&spec.name, config)))
}

fn parse_config<T: DeserializeOwned>(spec: &LayerSpec) -> Result<T, ModelError> {
    serde_json::from_value(spec.config.clone()).map_err(|e| ModelError::InvalidConfig {
        layer: spec.name.clone(),
        reason: e.to_string(),
    })
}

fn take_matrix(bank: &mut TensorBank, name: &str) -> Result<Array2<f32>, ModelError> {
    let tensor = bank.take(name)?;
    let stored = tensor.shape().to_vec();
    tensor
        .into_dimensionality::<Ix2>()
        .map_err(|_| ModelError::ShapeMismatch {
            name: name.to_string(),
            stored,
            expected: "a rank-2 kernel".to_string(),
        })
}

fn take_vector(bank: &mut TensorBank, name: &str) -> Result<Array1<f32>, ModelError> {
    let tensor = bank.take(name)?;
    let stored = tensor.shape().to_vec();
    tensor
        .into_dimensionality::<Ix1>()
        .map_err(|_| ModelError::ShapeMismatch {
            name: name.to_string(),
            stored,
            expected: "a rank-1 bias".to_string(),
        })
}
