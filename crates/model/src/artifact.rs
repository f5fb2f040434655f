//! Single-file model artifact: magic, format version, a length-prefixed JSON
//! manifest describing the graph, then a raw little-endian f32 blob holding
//! every weight tensor.

use crate::errors::ModelError;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"NNET";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8;

/// The input contract the network was trained against. Channels determine
/// the patch width, so custom layers bind against this before touching any
/// stored weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

/// One layer of the persisted graph: a kind tag resolved through the
/// registry plus the configuration the layer was saved with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub kind: String,
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Directory entry for one weight tensor in the blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub offset: u64,
}

impl TensorSpec {
    pub fn len_bytes(&self) -> usize {
        self.shape.iter().product::<usize>() * size_of::<f32>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub input: InputSpec,
    pub layers: Vec<LayerSpec>,
    pub tensors: Vec<TensorSpec>,
}

/// A parsed artifact: the manifest plus the raw weight blob.
pub struct Artifact {
    pub manifest: Manifest,
    blob: Vec<u8>,
}

impl Artifact {
    pub fn read(path: &Path) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        if bytes.len() < HEADER_LEN {
            return Err(ModelError::Corrupt("shorter than the fixed header".to_string()));
        }
        if bytes[..4] != MAGIC {
            return Err(ModelError::Corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(ModelError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }
        let manifest_len = u64::from_le_bytes([
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        ]) as usize;
        let Some(blob_start) = HEADER_LEN.checked_add(manifest_len) else {
            return Err(ModelError::Corrupt("manifest length overflows".to_string()));
        };
        if bytes.len() < blob_start {
            return Err(ModelError::Corrupt("truncated manifest".to_string()));
        }

        let manifest: Manifest = serde_json::from_slice(&bytes[HEADER_LEN..blob_start])?;
        let blob = bytes[blob_start..].to_vec();

        for tensor in &manifest.tensors {
            let end = (tensor.offset as usize).checked_add(tensor.len_bytes());
            if end.is_none_or(|end| end > blob.len()) {
                return Err(ModelError::Corrupt(format!(
                    "tensor `{}` extends past the weight blob",
                    tensor.name
                )));
            }
        }

        Ok(Self { manifest, blob })
    }

    /// Raw little-endian bytes of one tensor. Offsets were validated at
    /// parse time.
    pub fn tensor_bytes(&self, spec: &TensorSpec) -> &[u8] {
        let start = spec.offset as usize;
        &self.blob[start..start + spec.len_bytes()]
    }

    /// Serialize a graph plus named tensors into the container format.
    pub fn to_bytes(
        input: InputSpec,
        layers: &[LayerSpec],
        tensors: &[(String, ArrayD<f32>)],
    ) -> Result<Vec<u8>, ModelError> {
        let mut blob: Vec<u8> = Vec::new();
        let mut specs = Vec::with_capacity(tensors.len());
        for (name, tensor) in tensors {
            let offset = blob.len() as u64;
            let standard = tensor.as_standard_layout();
            let values = standard.as_slice().ok_or_else(|| {
                ModelError::Corrupt(format!("tensor `{name}` is not contiguous"))
            })?;
            blob.extend_from_slice(bytemuck::cast_slice(values));
            specs.push(TensorSpec {
                name: name.clone(),
                shape: tensor.shape().to_vec(),
                offset,
            });
        }

        let manifest = Manifest {
            input,
            layers: layers.to_vec(),
            tensors: specs,
        };
        let manifest_json = serde_json::to_vec(&manifest)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + manifest_json.len() + blob.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(manifest_json.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&manifest_json);
        bytes.extend_from_slice(&blob);
        Ok(bytes)
    }

    pub fn write(
        path: &Path,
        input: InputSpec,
        layers: &[LayerSpec],
        tensors: &[(String, ArrayD<f32>)],
    ) -> Result<(), ModelError> {
        let bytes = Self::to_bytes(input, layers, tensors)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
