use crate::errors::ModelError;
use ndarray::{Array1, Array2, ArrayD, Axis, Ix3, IxDyn};
use serde::{Deserialize, Serialize};

/// A forward-computable unit of the loaded network.
///
/// `kind`, `config` and `weights` describe the layer well enough to write it
/// back into an artifact, mirroring the per-layer configuration the layer
/// was persisted with at training time.
pub trait Layer: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    fn forward(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>, ModelError>;

    /// Persisted configuration; `{}` for layers that have none.
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Weight tensors in artifact naming; empty for stateless layers.
    fn weights(&self) -> Vec<(String, ArrayD<f32>)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, values: &mut Array2<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => values.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => values.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseConfig {
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
}

/// Fully connected layer applied along the last axis.
pub struct Dense {
    name: String,
    config: DenseConfig,
    kernel: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    pub const KIND: &'static str = "Dense";

    pub fn new(
        name: impl Into<String>,
        config: DenseConfig,
        kernel: Array2<f32>,
        bias: Array1<f32>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if config.units == 0 {
            return Err(ModelError::InvalidConfig {
                layer: name,
                reason: "units must be positive".to_string(),
            });
        }
        if kernel.ncols() != config.units {
            return Err(ModelError::ShapeMismatch {
                name: format!("{name}/kernel"),
                stored: kernel.shape().to_vec(),
                expected: format!("({}, {})", kernel.nrows(), config.units),
            });
        }
        if bias.len() != config.units {
            return Err(ModelError::ShapeMismatch {
                name: format!("{name}/bias"),
                stored: bias.shape().to_vec(),
                expected: format!("({})", config.units),
            });
        }
        Ok(Self {
            name,
            config,
            kernel,
            bias,
        })
    }
}

impl Layer for Dense {
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
        let Some((&last, lead)) = shape.split_last() else {
            return Err(ModelError::BadInput {
                layer: self.name.clone(),
                shape,
                reason: "expected at least one axis".to_string(),
            });
        };
        if last != self.kernel.nrows() {
            return Err(ModelError::BadInput {
                layer: self.name.clone(),
                shape: shape.clone(),
                reason: format!("last axis must be {}", self.kernel.nrows()),
            });
        }

        let rows: usize = lead.iter().product();
        let flat = input
            .into_shape_with_order((rows, last))
            .map_err(|e| ModelError::BadInput {
                layer: self.name.clone(),
                shape: shape.clone(),
                reason: e.to_string(),
            })?;

        let mut out = flat.dot(&self.kernel);
        out += &self.bias;
        self.config.activation.apply(&mut out);

        let mut out_shape = lead.to_vec();
        out_shape.push(self.config.units);
        out.into_dyn()
            .into_shape_with_order(IxDyn(&out_shape))
            .map_err(|e| ModelError::BadInput {
                layer: self.name.clone(),
                shape: out_shape,
                reason: e.to_string(),
            })
    }

    fn weights(&self) -> Vec<(String, ArrayD<f32>)> {
        vec![
            (format!("{}/kernel", self.name), self.kernel.clone().into_dyn()),
            (format!("{}/bias", self.name), self.bias.clone().into_dyn()),
        ]
    }
}

/// Mean over the patch axis: `(batch, n, d)` -> `(batch, d)`.
pub struct GlobalAveragePooling1D {
    name: String,
}

impl GlobalAveragePooling1D {
    pub const KIND: &'static str = "GlobalAveragePooling1D";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Layer for GlobalAveragePooling1D {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn forward(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>, ModelError> {
        let shape = input.shape().to_vec();
        let sequence = input
            .into_dimensionality::<Ix3>()
            .map_err(|_| ModelError::BadInput {
                layer: self.name.clone(),
                shape: shape.clone(),
                reason: "expected (batch, n, d)".to_string(),
            })?;
        let pooled = sequence
            .mean_axis(Axis(1))
            .ok_or_else(|| ModelError::BadInput {
                layer: self.name.clone(),
                shape,
                reason: "cannot average over zero patches".to_string(),
            })?;
        Ok(pooled.into_dyn())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropoutConfig {
    #[serde(default)]
    pub rate: f32,
}

/// Identity at inference time; kept so training-time graphs load unchanged.
pub struct Dropout {
    name: String,
    config: DropoutConfig,
}

impl Dropout {
    pub const KIND: &'static str = "Dropout";

    pub fn new(name: impl Into<String>, config: DropoutConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl Layer for Dropout {
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
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, arr3};

    #[test]
    fn dense_applies_kernel_bias_and_activation() {
        let dense = Dense::new(
            "head",
            DenseConfig {
                units: 1,
                activation: Activation::Relu,
            },
            Array2::from_elem((2, 1), 1.0),
            Array1::from_elem(1, 0.5),
        )
        .unwrap();

        let out = dense.forward(arr2(&[[-1.0, 2.0]]).into_dyn()).unwrap();
        assert_eq!(out.shape(), &[1, 1]);
        assert_eq!(out[[0, 0]], 1.5);

        // Negative pre-activation clamps to zero under relu.
        let out = dense.forward(arr2(&[[-3.0, 1.0]]).into_dyn()).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
    }

    #[test]
    fn dense_keeps_leading_axes() {
        let dense = Dense::new(
            "proj",
            DenseConfig {
                units: 2,
                activation: Activation::Linear,
            },
            arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]),
            Array1::zeros(2),
        )
        .unwrap();

        let input = arr3(&[[[1.0, 2.0, 3.0], [0.0, 1.0, 0.0]]]).into_dyn();
        let out = dense.forward(input).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2]);
        assert_eq!(out[[0, 0, 0]], 4.0);
        assert_eq!(out[[0, 0, 1]], 5.0);
        assert_eq!(out[[0, 1, 0]], 0.0);
        assert_eq!(out[[0, 1, 1]], 1.0);
    }

    #[test]
    fn dense_rejects_a_mismatched_input_width() {
        let dense = Dense::new(
            "head",
            DenseConfig {
                units: 1,
                activation: Activation::Linear,
            },
            Array2::zeros((4, 1)),
            Array1::zeros(1),
        )
        .unwrap();

        let result = dense.forward(arr2(&[[1.0, 2.0]]).into_dyn());
        assert!(matches!(result, Err(ModelError::BadInput { .. })));
    }

    #[test]
    fn dense_constructor_validates_weight_shapes() {
        let config = DenseConfig {
            units: 3,
            activation: Activation::Linear,
        };
        let result = Dense::new("head", config.clone(), Array2::zeros((4, 2)), Array1::zeros(3));
        assert!(matches!(result, Err(ModelError::ShapeMismatch { .. })));

        let result = Dense::new("head", config, Array2::zeros((4, 3)), Array1::zeros(2));
        assert!(matches!(result, Err(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn sigmoid_of_zero_is_one_half() {
        let dense = Dense::new(
            "head",
            DenseConfig {
                units: 1,
                activation: Activation::Sigmoid,
            },
            Array2::zeros((1, 1)),
            Array1::zeros(1),
        )
        .unwrap();

        let out = dense.forward(arr2(&[[0.0]]).into_dyn()).unwrap();
        assert_eq!(out[[0, 0]], 0.5);
    }

    #[test]
    fn pooling_means_over_the_patch_axis() {
        let pool = GlobalAveragePooling1D::new("encoder_pool");
        let input = arr3(&[[[1.0, 2.0], [3.0, 4.0]]]).into_dyn();
        let out = pool.forward(input).unwrap();
        assert_eq!(out.shape(), &[1, 2]);
        assert_eq!(out[[0, 0]], 2.0);
        assert_eq!(out[[0, 1]], 3.0);
    }

    #[test]
    fn pooling_rejects_non_sequence_input() {
        let pool = GlobalAveragePooling1D::new("encoder_pool");
        let result = pool.forward(arr2(&[[1.0, 2.0]]).into_dyn());
        assert!(matches!(result, Err(ModelError::BadInput { .. })));
    }

    #[test]
    fn dropout_is_identity_at_inference() {
        let dropout = Dropout::new("dropout", DropoutConfig { rate: 0.2 });
        let input = arr2(&[[1.0, -2.0, 3.0]]).into_dyn();
        let out = dropout.forward(input.clone()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn activation_parses_from_lowercase_names() {
        let relu: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(relu, Activation::Relu);
        let sigmoid: Activation = serde_json::from_str("\"sigmoid\"").unwrap();
        assert_eq!(sigmoid, Activation::Sigmoid);
    }
}
