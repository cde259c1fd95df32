//! Image decoder mirroring VGG19 up to `block4_conv1`.
//!
//! The network is a fixed stack of reflection padding, 3x3 convolutions and nearest
//! upsampling. Only the convolution weights are learned; they are read from the
//! initializers of an ONNX file.

use std::path::Path;

use adain_utils::{WeightLayout, config::DecoderSettings, timing_guard};
use anyhow::{Context, Result};
use log::debug;
use ndarray::{Array1, Array4};
use tract_onnx::pb;

use crate::layers::{ActivationKind, Conv2d, ReflectionPad, Upsample};
use crate::onnx::OnnxInitializerMap;

/// One learned convolution of the standard decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub name: &'static str,
    pub in_channels: usize,
    pub out_channels: usize,
    pub relu: bool,
    /// Followed by a 2x nearest upsample.
    pub upsample_after: bool,
}

const fn conv(
    name: &'static str,
    in_channels: usize,
    out_channels: usize,
    relu: bool,
    upsample_after: bool,
) -> ConvSpec {
    ConvSpec {
        name,
        in_channels,
        out_channels,
        relu,
        upsample_after,
    }
}

/// Convolutions of the standard decoder in execution order.
pub const STANDARD_DECODER: [ConvSpec; 9] = [
    conv("conv4_1", 512, 256, true, true),
    conv("conv3_4", 256, 256, true, false),
    conv("conv3_3", 256, 256, true, false),
    conv("conv3_2", 256, 256, true, false),
    conv("conv3_1", 256, 128, true, true),
    conv("conv2_2", 128, 128, true, false),
    conv("conv2_1", 128, 64, true, true),
    conv("conv1_2", 64, 64, true, false),
    conv("conv1_1", 64, 3, false, false),
];

const KERNEL: usize = 3;

/// Naming and layout of decoder weights inside an ONNX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderWeightsConfig {
    /// Prepended to `{conv}.weight` and `{conv}.bias`.
    pub prefix: String,
    pub layout: WeightLayout,
}

impl Default for DecoderWeightsConfig {
    fn default() -> Self {
        DecoderSettings::default().into()
    }
}

impl From<DecoderSettings> for DecoderWeightsConfig {
    fn from(settings: DecoderSettings) -> Self {
        Self {
            prefix: settings.weight_prefix,
            layout: settings.weight_layout,
        }
    }
}

impl From<&DecoderSettings> for DecoderWeightsConfig {
    fn from(settings: &DecoderSettings) -> Self {
        settings.clone().into()
    }
}

impl DecoderWeightsConfig {
    pub fn weight_name(&self, conv: &str) -> String {
        format!("{}{conv}.weight", self.prefix)
    }

    pub fn bias_name(&self, conv: &str) -> String {
        format!("{}{conv}.bias", self.prefix)
    }
}

/// A single decoder stage.
#[derive(Debug, Clone)]
pub enum DecoderLayer {
    ReflectionPad(ReflectionPad),
    Conv2d(Conv2d),
    Upsample(Upsample),
}

impl DecoderLayer {
    fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        match self {
            DecoderLayer::ReflectionPad(pad) => pad.forward(input),
            DecoderLayer::Conv2d(conv) => conv.forward(input),
            DecoderLayer::Upsample(up) => Ok(up.forward(input)),
        }
    }
}

/// Sequential decoder over NCHW feature maps.
#[derive(Debug, Clone)]
pub struct Decoder {
    layers: Vec<DecoderLayer>,
    input_channels: usize,
    output_channels: usize,
}

impl Decoder {
    /// Assemble a decoder, checking that consecutive convolutions agree on channel counts.
    pub fn new(layers: Vec<DecoderLayer>) -> Result<Self> {
        let mut convs = layers.iter().filter_map(|layer| match layer {
            DecoderLayer::Conv2d(conv) => Some(conv),
            _ => None,
        });
        let first = convs.next().context("decoder needs at least one convolution")?;
        let input_channels = first.in_channels();
        let mut output_channels = first.out_channels();
        for (index, conv) in convs.enumerate() {
            anyhow::ensure!(
                conv.in_channels() == output_channels,
                "convolution {} expects {} channels but the previous one produces {}",
                index + 1,
                conv.in_channels(),
                output_channels
            );
            output_channels = conv.out_channels();
        }

        Ok(Self {
            layers,
            input_channels,
            output_channels,
        })
    }

    /// Build the standard decoder, asking `weights` for each convolution's kernel and bias.
    ///
    /// Kernels are interpreted in `layout` and must match the channel counts of
    /// [`STANDARD_DECODER`] with a 3x3 window.
    pub fn standard<F>(layout: WeightLayout, mut weights: F) -> Result<Self>
    where
        F: FnMut(&ConvSpec) -> Result<(Array4<f32>, Array1<f32>)>,
    {
        let mut layers = Vec::with_capacity(STANDARD_DECODER.len() * 2 + 3);
        for stage in &STANDARD_DECODER {
            let (kernel, bias) = weights(stage)?;
            let activation = stage.relu.then_some(ActivationKind::Relu);
            let conv = Conv2d::from_weights(kernel, bias, layout, activation)
                .with_context(|| format!("invalid weights for {}", stage.name))?;
            anyhow::ensure!(
                conv.in_channels() == stage.in_channels
                    && conv.out_channels() == stage.out_channels
                    && conv.kernel_size() == (KERNEL, KERNEL),
                "{} has {}->{} channels with a {:?} kernel, expected {}->{} with 3x3",
                stage.name,
                conv.in_channels(),
                conv.out_channels(),
                conv.kernel_size(),
                stage.in_channels,
                stage.out_channels
            );

            layers.push(DecoderLayer::ReflectionPad(ReflectionPad::uniform(1)));
            layers.push(DecoderLayer::Conv2d(conv));
            if stage.upsample_after {
                layers.push(DecoderLayer::Upsample(Upsample::nearest(2)?));
            }
        }
        Self::new(layers)
    }

    /// Load the standard decoder from the initializers of an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P, config: &DecoderWeightsConfig) -> Result<Self> {
        let path = path.as_ref();
        let names = initializer_names(config);
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let initializers = OnnxInitializerMap::load(path, &refs)?;
        let decoder = Self::from_initializers(&initializers, config)
            .with_context(|| format!("failed to assemble decoder from {}", path.display()))?;
        debug!(
            "Loaded decoder weights from {} ({} layers)",
            path.display(),
            decoder.layers.len()
        );
        Ok(decoder)
    }

    /// Build the standard decoder from an in-memory ONNX model.
    pub fn from_model_proto(proto: &pb::ModelProto, config: &DecoderWeightsConfig) -> Result<Self> {
        let names = initializer_names(config);
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let initializers = OnnxInitializerMap::from_model_proto(proto, &refs)?;
        Self::from_initializers(&initializers, config)
    }

    fn from_initializers(
        initializers: &OnnxInitializerMap,
        config: &DecoderWeightsConfig,
    ) -> Result<Self> {
        Self::standard(config.layout, |stage| {
            let kernel = initializers.tensor(&config.weight_name(stage.name))?.to_array4()?;
            let bias = initializers.tensor(&config.bias_name(stage.name))?.to_array1()?;
            Ok((kernel, bias))
        })
    }

    /// Decode a batch of feature maps into images.
    pub fn forward(&self, features: &Array4<f32>) -> Result<Array4<f32>> {
        let _guard = timing_guard("adain_core::decoder_forward", log::Level::Debug);
        anyhow::ensure!(
            features.dim().1 == self.input_channels,
            "decoder expects {} input channels, got {}",
            self.input_channels,
            features.dim().1
        );

        let mut layers = self.layers.iter();
        let Some(first) = layers.next() else {
            return Ok(features.clone());
        };
        let mut current = first.forward(features)?;
        for layer in layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Ratio between output and input spatial size.
    pub fn scale_factor(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                DecoderLayer::Upsample(up) => up.factor(),
                _ => 1,
            })
            .product()
    }

    pub fn layers(&self) -> &[DecoderLayer] {
        &self.layers
    }
}

fn initializer_names(config: &DecoderWeightsConfig) -> Vec<String> {
    STANDARD_DECODER
        .iter()
        .flat_map(|stage| [config.weight_name(stage.name), config.bias_name(stage.name)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::tests::{float_initializer, model_with_initializers};
    use ndarray::Array;

    fn synthetic_kernel(stage: &ConvSpec) -> (Array4<f32>, Array1<f32>) {
        let fan_in = (stage.in_channels * KERNEL * KERNEL) as f32;
        let kernel = Array::from_shape_fn(
            (stage.out_channels, stage.in_channels, KERNEL, KERNEL),
            |(o, i, y, x)| (((o * 13 + i * 7 + y * 3 + x) % 11) as f32 - 5.0) / fan_in,
        );
        let bias = Array1::from_shape_fn(stage.out_channels, |o| (o % 5) as f32 * 0.01);
        (kernel, bias)
    }

    fn synthetic_decoder() -> Decoder {
        Decoder::standard(WeightLayout::Oihw, |stage| Ok(synthetic_kernel(stage))).unwrap()
    }

    #[test]
    fn standard_decoder_upsamples_to_rgb() {
        let decoder = synthetic_decoder();
        assert_eq!(decoder.input_channels(), 512);
        assert_eq!(decoder.output_channels(), 3);
        assert_eq!(decoder.scale_factor(), 8);
        assert_eq!(decoder.layers().len(), 21);

        let features = Array::from_shape_fn((1, 512, 2, 3), |(_, c, y, x)| {
            ((c + y * 2 + x) % 9) as f32 * 0.1
        });
        let out = decoder.forward(&features).unwrap();
        assert_eq!(out.dim(), (1, 3, 16, 24));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn smallest_input_size_decodes() {
        use crate::preprocess::{ENCODER_STRIDE, InputSize};

        let decoder = synthetic_decoder();
        let size = InputSize::for_image((10, 40), 0, ENCODER_STRIDE).unwrap();
        let stride = ENCODER_STRIDE as usize;
        let (h, w) = (size.height as usize / stride, size.width as usize / stride);
        assert_eq!((h, w), (5, 2));

        let features = Array::from_shape_fn((1, 512, h, w), |(_, c, y, x)| {
            ((c + y + x) % 7) as f32 * 0.1
        });
        let out = decoder.forward(&features).unwrap();
        assert_eq!(out.dim(), (1, 3, size.height as usize, size.width as usize));
    }

    #[test]
    fn forward_rejects_wrong_channel_count() {
        let decoder = synthetic_decoder();
        assert!(decoder.forward(&Array4::zeros((1, 256, 4, 4))).is_err());
    }

    #[test]
    fn new_checks_channel_continuity() {
        let a = Conv2d::new(Array4::zeros((4, 3, 1, 1)), Array1::zeros(4), None).unwrap();
        let b = Conv2d::new(Array4::zeros((2, 5, 1, 1)), Array1::zeros(2), None).unwrap();
        let err = Decoder::new(vec![DecoderLayer::Conv2d(a), DecoderLayer::Conv2d(b)]).unwrap_err();
        assert!(err.to_string().contains("expects 5 channels"), "{err}");

        assert!(Decoder::new(vec![DecoderLayer::Upsample(Upsample::nearest(2).unwrap())]).is_err());
    }

    #[test]
    fn small_custom_decoder_runs() {
        let conv = Conv2d::new(Array4::from_elem((1, 2, 3, 3), 1.0), Array1::zeros(1), None).unwrap();
        let decoder = Decoder::new(vec![
            DecoderLayer::ReflectionPad(ReflectionPad::uniform(1)),
            DecoderLayer::Conv2d(conv),
            DecoderLayer::Upsample(Upsample::nearest(2).unwrap()),
        ])
        .unwrap();
        let out = decoder.forward(&Array4::from_elem((2, 2, 3, 3), 1.0)).unwrap();
        assert_eq!(out.dim(), (2, 1, 6, 6));
        assert!(out.iter().all(|&v| (v - 18.0).abs() < 1e-5));
    }

    #[test]
    fn rejects_kernels_with_wrong_shape() {
        let err = Decoder::standard(WeightLayout::Oihw, |stage| {
            Ok((
                Array4::zeros((stage.out_channels, stage.in_channels, 1, 1)),
                Array1::zeros(stage.out_channels),
            ))
        })
        .unwrap_err();
        assert!(err.to_string().contains("conv4_1"), "{err}");
    }

    #[test]
    fn loads_from_onnx_initializers() {
        let config = DecoderWeightsConfig {
            prefix: "dec/".to_string(),
            layout: WeightLayout::Hwio,
        };
        let mut initializers = Vec::new();
        for stage in &STANDARD_DECODER {
            let (kernel, bias) = synthetic_kernel(stage);
            let hwio = kernel.permuted_axes([2, 3, 1, 0]);
            let dims: Vec<i64> = hwio.shape().iter().map(|&d| d as i64).collect();
            let data: Vec<f32> = hwio.iter().copied().collect();
            initializers.push(float_initializer(&config.weight_name(stage.name), &dims, &data));
            initializers.push(float_initializer(
                &config.bias_name(stage.name),
                &[stage.out_channels as i64],
                bias.as_slice().unwrap(),
            ));
        }
        let proto = model_with_initializers(initializers);
        let loaded = Decoder::from_model_proto(&proto, &config).unwrap();

        let features = Array::from_shape_fn((1, 512, 2, 2), |(_, c, y, x)| {
            ((c * 3 + y + x) % 7) as f32 * 0.2
        });
        let expected = synthetic_decoder().forward(&features).unwrap();
        let got = loaded.forward(&features).unwrap();
        let diff = got
            .iter()
            .zip(expected.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(diff < 1e-4, "max diff {diff}");
    }

    #[test]
    fn missing_weights_are_named() {
        let proto = model_with_initializers(vec![float_initializer("decoder.conv4_1.bias", &[1], &[0.0])]);
        let err = Decoder::from_model_proto(&proto, &DecoderWeightsConfig::default()).unwrap_err();
        assert!(err.to_string().contains("decoder.conv1_1.weight"), "{err}");
    }

    #[test]
    fn missing_file_errors() {
        assert!(Decoder::load("missing/decoder.onnx", &DecoderWeightsConfig::default()).is_err());
    }
}
