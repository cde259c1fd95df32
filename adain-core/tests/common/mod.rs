#![allow(dead_code)]

use std::path::PathBuf;

use adain_core::{Conv2d, Decoder, DecoderLayer, EncoderConfig, ReflectionPad};
use adain_utils::TensorLayout;
use ndarray::{Array1, Array4};
use tract_onnx::pb;

pub const ENCODER_LAYERS: [&str; 2] = ["block1_conv1", "block2_conv1"];

pub const ENCODER_REL_PATH: &str = "models/vgg19.onnx";
pub const DECODER_REL_PATH: &str = "models/adain_decoder.onnx";

/// Look for a model file relative to the working directory or the workspace root.
pub fn model_file_path(relative: &str) -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(relative)];
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if let Some(workspace_root) = manifest_dir.parent() {
        candidates.push(workspace_root.join(relative));
    }
    candidates.into_iter().find(|path| path.exists())
}

fn float_input(name: &str) -> pb::ValueInfoProto {
    pb::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(pb::TypeProto {
            value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                elem_type: pb::tensor_proto::DataType::Float as i32,
                ..Default::default()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn node(name: &str, op_type: &str, input: &str, output: &str) -> pb::NodeProto {
    pb::NodeProto {
        name: name.to_string(),
        op_type: op_type.to_string(),
        input: vec![input.to_string()],
        output: vec![output.to_string()],
        ..Default::default()
    }
}

/// Two-node stand-in for VGG: `block1_conv1/Relu` then `block2_conv1/Neg`.
///
/// Both ops are elementwise, so the graph accepts any shape and layout.
pub fn elementwise_encoder_proto() -> pb::ModelProto {
    pb::ModelProto {
        ir_version: 7,
        opset_import: vec![pb::OperatorSetIdProto {
            domain: String::new(),
            version: 13,
            ..Default::default()
        }],
        graph: Some(pb::GraphProto {
            name: "elementwise_vgg".to_string(),
            node: vec![
                node("block1_conv1/Relu", "Relu", "input", "relu_out"),
                node("block2_conv1/Neg", "Neg", "relu_out", "neg_out"),
            ],
            input: vec![float_input("input")],
            output: vec![float_input("neg_out")],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn encoder_config(layout: TensorLayout) -> EncoderConfig {
    EncoderConfig {
        layers: ENCODER_LAYERS.iter().map(|s| s.to_string()).collect(),
        layout,
    }
}

/// Reflection pad followed by a 3x3 convolution that copies its input.
pub fn identity_decoder() -> Decoder {
    let mut kernel = Array4::<f32>::zeros((3, 3, 3, 3));
    for c in 0..3 {
        kernel[(c, c, 1, 1)] = 1.0;
    }
    let conv = Conv2d::new(kernel, Array1::zeros(3), None).expect("identity conv");
    Decoder::new(vec![
        DecoderLayer::ReflectionPad(ReflectionPad::uniform(1)),
        DecoderLayer::Conv2d(conv),
    ])
    .expect("identity decoder")
}

pub fn signed_ramp(shape: (usize, usize, usize, usize)) -> Array4<f32> {
    Array4::from_shape_fn(shape, |(b, c, y, x)| {
        ((b * 5 + c * 3 + y * 7 + x * 2) % 9) as f32 - 4.0
    })
}
