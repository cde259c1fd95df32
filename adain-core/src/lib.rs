//! Core AdaIN style-transfer primitives.
//!
//! This crate runs the pretrained VGG19 encoder with `tract-onnx`, aligns feature
//! statistics with AdaIN, and reconstructs images with a CPU decoder built from
//! `ndarray` layers.

/// Adaptive instance normalisation.
pub mod adain;
/// Learned decoder (padding, convolution, upsampling).
pub mod decoder;
/// ONNX encoder wrapper exposing intermediate activations.
pub mod encoder;
/// CPU tensor layers.
pub mod layers;
/// Content and style losses.
pub mod loss;
/// ONNX initializer loading.
pub mod onnx;
/// Tensor to image conversion.
pub mod postprocess;
/// Image pre-processing (resizing, normalisation, tensor conversion).
pub mod preprocess;
/// End-to-end pipeline.
pub mod stylizer;

pub use adain::{AdaIn, ChannelStats, channel_statistics};
pub use adain_utils::PixelNormalization;
pub use decoder::{ConvSpec, Decoder, DecoderLayer, DecoderWeightsConfig, STANDARD_DECODER};
pub use encoder::{EncoderConfig, FeatureExtractor, VggEncoder};
pub use layers::{ActivationKind, Conv2d, ReflectionPad, Upsample};
pub use loss::{StyleLosses, content_loss, style_loss};
pub use onnx::{OnnxInitializerMap, OnnxTensor};
pub use postprocess::{restore_size, tensor_to_image, tensor_to_images};
pub use preprocess::{
    CAFFE_MEANS_BGR, ENCODER_STRIDE, InputSize, PreprocessConfig, PreprocessOutput,
    preprocess_dynamic_image, preprocess_image, resize_filter,
};
pub use stylizer::{StylizeOutput, StylizedImage, Stylizer, StylizerConfig, WeightedStyle};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
