//! Float initializer extraction from ONNX files.
//!
//! Decoder weights ship as the initializers of an ONNX graph; only the named tensors are
//! decoded and kept.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use ndarray::{Array1, Array4};
use tract_onnx::{pb, prelude::Framework};

/// Named float initializers pulled from an ONNX model.
#[derive(Debug)]
pub struct OnnxInitializerMap {
    tensors: HashMap<String, OnnxTensor>,
}

impl OnnxInitializerMap {
    /// Load the ONNX model at `model_path` and retain only the requested initializer names.
    pub fn load<P: AsRef<Path>>(model_path: P, names: &[&str]) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "weights file not found: {}", path.display());
        let proto = tract_onnx::onnx()
            .proto_model_for_path(path)
            .map_err(|e| anyhow!("failed to decode ONNX protobuf {}: {e}", path.display()))?;
        Self::from_model_proto(&proto, names)
            .with_context(|| format!("while reading initializers from {}", path.display()))
    }

    /// Retain the requested initializers of an already decoded model.
    pub fn from_model_proto(proto: &pb::ModelProto, names: &[&str]) -> Result<Self> {
        let graph = proto.graph.as_ref().context("ONNX model missing GraphProto")?;

        let wanted: HashSet<&str> = names.iter().copied().collect();
        let mut tensors = HashMap::with_capacity(wanted.len());
        for tensor in &graph.initializer {
            if wanted.contains(tensor.name.as_str()) {
                tensors.insert(tensor.name.clone(), OnnxTensor::from_proto(tensor)?);
            }
        }

        let mut missing: Vec<&str> = wanted
            .into_iter()
            .filter(|name| !tensors.contains_key(*name))
            .collect();
        missing.sort_unstable();
        anyhow::ensure!(
            missing.is_empty(),
            "initializers not found: {}",
            missing.join(", ")
        );

        Ok(Self { tensors })
    }

    /// Borrow an initializer tensor by name.
    pub fn tensor(&self, name: &str) -> Result<&OnnxTensor> {
        self.tensors
            .get(name)
            .with_context(|| format!("initializer '{name}' not loaded"))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Float tensor extracted from an ONNX initializer.
#[derive(Debug, Clone)]
pub struct OnnxTensor {
    name: String,
    dims: Vec<usize>,
    data: Vec<f32>,
}

impl OnnxTensor {
    fn from_proto(proto: &pb::TensorProto) -> Result<Self> {
        use pb::tensor_proto::DataType;
        anyhow::ensure!(
            proto.data_type == DataType::Float as i32,
            "initializer '{}' is not a float tensor (data type {})",
            proto.name,
            proto.data_type
        );

        let dims = proto
            .dims
            .iter()
            .map(|&d| usize::try_from(d).with_context(|| format!("invalid dimension value {d}")))
            .collect::<Result<Vec<_>>>()?;

        let data = if !proto.raw_data.is_empty() {
            anyhow::ensure!(
                proto.raw_data.len() % 4 == 0,
                "initializer '{}' raw data is not a whole number of floats",
                proto.name
            );
            proto
                .raw_data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect::<Vec<_>>()
        } else if !proto.float_data.is_empty() {
            proto.float_data.clone()
        } else {
            return Err(anyhow!("initializer '{}' has no data payload", proto.name));
        };

        anyhow::ensure!(
            data.len() == dims.iter().product::<usize>(),
            "initializer '{}' data length ({}) does not match shape {:?}",
            proto.name,
            data.len(),
            dims
        );

        Ok(Self {
            name: proto.name.clone(),
            dims,
            data,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tensor dimensions.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Flattened data buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Copy into a rank-4 array, failing on any other rank.
    pub fn to_array4(&self) -> Result<Array4<f32>> {
        let &[a, b, c, d] = self.dims.as_slice() else {
            anyhow::bail!(
                "initializer '{}' has shape {:?}, expected rank 4",
                self.name,
                self.dims
            );
        };
        Array4::from_shape_vec((a, b, c, d), self.data.clone())
            .with_context(|| format!("initializer '{}' has inconsistent shape", self.name))
    }

    /// Copy into a rank-1 array, failing on any other rank.
    pub fn to_array1(&self) -> Result<Array1<f32>> {
        anyhow::ensure!(
            self.dims.len() == 1,
            "initializer '{}' has shape {:?}, expected rank 1",
            self.name,
            self.dims
        );
        Ok(Array1::from_vec(self.data.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn float_initializer(name: &str, dims: &[i64], data: &[f32]) -> pb::TensorProto {
        pb::TensorProto {
            name: name.to_string(),
            dims: dims.to_vec(),
            data_type: pb::tensor_proto::DataType::Float as i32,
            float_data: data.to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn model_with_initializers(initializers: Vec<pb::TensorProto>) -> pb::ModelProto {
        pb::ModelProto {
            graph: Some(pb::GraphProto {
                name: "weights".to_string(),
                initializer: initializers,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn keeps_only_requested_initializers() {
        let model = model_with_initializers(vec![
            float_initializer("a", &[2], &[1.0, 2.0]),
            float_initializer("b", &[1, 1, 1, 2], &[3.0, 4.0]),
        ]);
        let map = OnnxInitializerMap::from_model_proto(&model, &["b"]).unwrap();
        assert_eq!(map.len(), 1);
        let b = map.tensor("b").unwrap();
        assert_eq!(b.dims(), &[1, 1, 1, 2]);
        assert_eq!(b.to_array4().unwrap().dim(), (1, 1, 1, 2));
        assert!(b.to_array1().is_err());
        assert!(map.tensor("a").is_err());
    }

    #[test]
    fn decodes_little_endian_raw_data() {
        let raw: Vec<u8> = [1.5f32, -2.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let tensor = pb::TensorProto {
            name: "raw".to_string(),
            dims: vec![2],
            data_type: pb::tensor_proto::DataType::Float as i32,
            raw_data: raw,
            ..Default::default()
        };
        let map =
            OnnxInitializerMap::from_model_proto(&model_with_initializers(vec![tensor]), &["raw"])
                .unwrap();
        assert_eq!(map.tensor("raw").unwrap().data(), &[1.5, -2.0]);
    }

    #[test]
    fn reports_every_missing_name() {
        let model = model_with_initializers(vec![float_initializer("a", &[1], &[0.0])]);
        let err = OnnxInitializerMap::from_model_proto(&model, &["z", "a", "y"]).unwrap_err();
        assert!(err.to_string().contains("y, z"), "{err}");
    }

    #[test]
    fn rejects_shape_and_type_mismatches() {
        let model = model_with_initializers(vec![float_initializer("a", &[3], &[0.0, 1.0])]);
        assert!(OnnxInitializerMap::from_model_proto(&model, &["a"]).is_err());

        let mut int_tensor = float_initializer("i", &[1], &[1.0]);
        int_tensor.data_type = pb::tensor_proto::DataType::Int64 as i32;
        let model = model_with_initializers(vec![int_tensor]);
        assert!(OnnxInitializerMap::from_model_proto(&model, &["i"]).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = OnnxInitializerMap::load("missing/weights.onnx", &["a"]).unwrap_err();
        assert!(err.to_string().contains("weights file not found"));
    }
}
