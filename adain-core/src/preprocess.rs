//! Preprocessing utilities for preparing images for the VGG encoder.
//!
//! Images are resized so their shorter edge matches the configured length, snapped to a
//! multiple of the encoder stride, and laid out as `[1, 3, H, W]` tensors with the pixel
//! normalisation the encoder was trained with.

use std::{borrow::Cow, path::Path};

use adain_utils::{
    ChannelOrder, PixelNormalization, ResizeQuality, config::ImageInputSettings, load_image,
    resize_image, rgb_to_chw, timing_guard,
};
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use ndarray::{Array3, Array4, Axis};

/// ImageNet channel means in BGR order, as subtracted by Caffe-style VGG preprocessing.
pub const CAFFE_MEANS_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Spatial reduction of VGG19 up to `block4_conv1` (three 2x pools).
pub const ENCODER_STRIDE: u32 = 8;

/// Smallest edge, in multiples of the alignment, that still leaves 2-pixel feature maps
/// for the decoder's reflection padding.
const MIN_ALIGNED_EDGE: u32 = 2;

/// Encoder input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pick the encoder input size for an image of `original` dimensions.
    ///
    /// The shorter edge is scaled to `short_side` (`0` keeps the original size) with the
    /// aspect ratio preserved, then both edges are rounded down to a multiple of `align`,
    /// never going below `2 * align`.
    pub fn for_image(original: (u32, u32), short_side: u32, align: u32) -> Result<Self> {
        let (orig_w, orig_h) = original;
        anyhow::ensure!(
            orig_w > 0 && orig_h > 0,
            "source image dimensions must be greater than zero"
        );
        anyhow::ensure!(align > 0, "alignment must be greater than zero");

        let (width, height) = if short_side == 0 {
            (orig_w, orig_h)
        } else {
            let scale = short_side as f64 / orig_w.min(orig_h) as f64;
            (
                (orig_w as f64 * scale).round() as u32,
                (orig_h as f64 * scale).round() as u32,
            )
        };

        let snap = |value: u32| (value / align * align).max(MIN_ALIGNED_EDGE * align);
        Ok(Self::new(snap(width), snap(height)))
    }
}

/// Configuration for preprocessing an image before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Target length of the shorter edge; `0` keeps the original size.
    pub short_side: u32,
    /// Both output edges are multiples of this value.
    pub align: u32,
    pub resize_quality: ResizeQuality,
    pub normalization: PixelNormalization,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            short_side: 512,
            align: ENCODER_STRIDE,
            resize_quality: ResizeQuality::Quality,
            normalization: PixelNormalization::Caffe,
        }
    }
}

impl PreprocessConfig {
    pub fn from_settings(input: &ImageInputSettings, normalization: PixelNormalization) -> Self {
        Self {
            short_side: input.short_side,
            resize_quality: input.resize_quality,
            normalization,
            ..Self::default()
        }
    }
}

/// Output of preprocessing: tensor plus the sizes needed to undo the resize.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    /// `[1, 3, H, W]` tensor ready for the encoder.
    pub tensor: Array4<f32>,
    /// Dimensions of the source image.
    pub original_size: (u32, u32),
    pub input_size: InputSize,
}

pub fn resize_filter(quality: ResizeQuality) -> FilterType {
    match quality {
        ResizeQuality::Quality => FilterType::Triangle,
        ResizeQuality::Speed => FilterType::Nearest,
    }
}

pub(crate) fn channel_order(normalization: PixelNormalization) -> ChannelOrder {
    match normalization {
        PixelNormalization::Caffe => ChannelOrder::Bgr,
        PixelNormalization::Raw => ChannelOrder::Rgb,
    }
}

pub(crate) fn channel_means(normalization: PixelNormalization) -> [f32; 3] {
    match normalization {
        PixelNormalization::Caffe => CAFFE_MEANS_BGR,
        PixelNormalization::Raw => [0.0; 3],
    }
}

/// Preprocess an image file into an encoder-ready tensor.
pub fn preprocess_image<P: AsRef<Path>>(
    path: P,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("adain_core::preprocess_image", log::Level::Debug);
    let path_ref = path.as_ref();
    anyhow::ensure!(
        path_ref.exists(),
        "input image does not exist: {}",
        path_ref.display()
    );

    let image = load_image(path_ref)
        .with_context(|| format!("failed to load image from {}", path_ref.display()))?;
    preprocess_dynamic_image(&image, config)
}

/// Preprocess an in-memory image.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("adain_core::preprocess_dynamic_image", log::Level::Trace);
    let original_size = image.dimensions();
    let input_size = InputSize::for_image(original_size, config.short_side, config.align)?;

    let resized: Cow<'_, RgbImage> = if original_size == (input_size.width, input_size.height) {
        match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        }
    } else {
        Cow::Owned(resize_image(
            image,
            input_size.width,
            input_size.height,
            resize_filter(config.resize_quality),
        ))
    };

    let mut chw = rgb_to_chw(&resized, channel_order(config.normalization));
    subtract_means(&mut chw, channel_means(config.normalization));

    Ok(PreprocessOutput {
        tensor: chw.insert_axis(Axis(0)),
        original_size,
        input_size,
    })
}

fn subtract_means(chw: &mut Array3<f32>, means: [f32; 3]) {
    for (mut plane, mean) in chw.outer_iter_mut().zip(means) {
        plane.mapv_inplace(|v| v - mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn input_size_scales_short_side_and_aligns() {
        let size = InputSize::for_image((1000, 500), 256, 8).unwrap();
        assert_eq!(size, InputSize::new(512, 256));

        let size = InputSize::for_image((333, 500), 100, 8).unwrap();
        // 100 x 150.15 -> 96 x 144
        assert_eq!(size, InputSize::new(96, 144));
    }

    #[test]
    fn input_size_keeps_original_when_short_side_is_zero() {
        let size = InputSize::for_image((37, 20), 0, 8).unwrap();
        assert_eq!(size, InputSize::new(32, 16));
        let tiny = InputSize::for_image((3, 5), 0, 8).unwrap();
        assert_eq!(tiny, InputSize::new(16, 16));
    }

    #[test]
    fn narrow_images_keep_two_feature_pixels() {
        let size = InputSize::for_image((10, 40), 0, ENCODER_STRIDE).unwrap();
        assert_eq!(size, InputSize::new(16, 40));
        let size = InputSize::for_image((200, 12), 12, ENCODER_STRIDE).unwrap();
        assert_eq!(size, InputSize::new(200, 16));
    }

    #[test]
    fn input_size_rejects_degenerate_inputs() {
        assert!(InputSize::for_image((0, 10), 64, 8).is_err());
        assert!(InputSize::for_image((10, 10), 64, 0).is_err());
    }

    #[test]
    fn caffe_preprocess_generates_mean_subtracted_bgr() {
        let img = ImageBuffer::from_fn(16, 16, |x, _| {
            if x < 8 { Rgb([200u8, 10, 0]) } else { Rgb([0u8, 0, 0]) }
        });
        let image = DynamicImage::ImageRgb8(img);
        let config = PreprocessConfig {
            short_side: 0,
            ..PreprocessConfig::default()
        };
        let output = preprocess_dynamic_image(&image, &config).unwrap();

        assert_eq!(output.tensor.dim(), (1, 3, 16, 16));
        assert_eq!(output.original_size, (16, 16));
        assert_eq!(output.input_size, InputSize::new(16, 16));
        // plane 0 is blue, plane 2 is red
        assert!((output.tensor[(0, 0, 0, 0)] - (0.0 - 103.939)).abs() < 1e-4);
        assert!((output.tensor[(0, 1, 0, 0)] - (10.0 - 116.779)).abs() < 1e-4);
        assert!((output.tensor[(0, 2, 0, 0)] - (200.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn raw_preprocess_keeps_rgb_values() {
        let img = ImageBuffer::from_pixel(16, 16, Rgb([1u8, 2, 3]));
        let config = PreprocessConfig {
            short_side: 0,
            normalization: PixelNormalization::Raw,
            ..PreprocessConfig::default()
        };
        let output = preprocess_dynamic_image(&DynamicImage::ImageRgb8(img), &config).unwrap();
        assert_eq!(output.tensor[(0, 0, 3, 3)], 1.0);
        assert_eq!(output.tensor[(0, 2, 3, 3)], 3.0);
    }

    #[test]
    fn resizes_to_requested_short_side() {
        let img = ImageBuffer::from_pixel(40, 20, Rgb([50u8, 60, 70]));
        let config = PreprocessConfig {
            short_side: 16,
            ..PreprocessConfig::default()
        };
        let output = preprocess_dynamic_image(&DynamicImage::ImageRgb8(img), &config).unwrap();
        assert_eq!(output.tensor.dim(), (1, 3, 16, 32));
        assert_eq!(output.original_size, (40, 20));
    }

    #[test]
    fn settings_convert_into_config() {
        let settings = ImageInputSettings {
            short_side: 300,
            resize_quality: ResizeQuality::Speed,
        };
        let config = PreprocessConfig::from_settings(&settings, PixelNormalization::Raw);
        assert_eq!(config.short_side, 300);
        assert_eq!(config.align, ENCODER_STRIDE);
        assert_eq!(config.resize_quality, ResizeQuality::Speed);
        assert_eq!(resize_filter(config.resize_quality), FilterType::Nearest);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = preprocess_image("nope/missing.png", &PreprocessConfig::default()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
