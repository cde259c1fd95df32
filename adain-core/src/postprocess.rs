//! Conversion of decoded tensors back into images.

use adain_utils::{PixelNormalization, ResizeQuality, chw_to_rgb};
use anyhow::Result;
use image::{RgbImage, imageops};
use ndarray::{Array4, Axis};

use crate::preprocess::{channel_means, channel_order, resize_filter};

/// Undo `normalization` on the first batch entry of `tensor` and build an RGB image.
///
/// Values are rounded and clamped to `0..=255`.
pub fn tensor_to_image(tensor: &Array4<f32>, normalization: PixelNormalization) -> Result<RgbImage> {
    let (n, c, _, _) = tensor.dim();
    anyhow::ensure!(n > 0, "decoded tensor has an empty batch");
    anyhow::ensure!(c == 3, "decoded tensor has {c} channels, expected 3");
    batch_entry_to_image(tensor, 0, normalization)
}

/// Convert every batch entry of `tensor` into an image.
pub fn tensor_to_images(
    tensor: &Array4<f32>,
    normalization: PixelNormalization,
) -> Result<Vec<RgbImage>> {
    (0..tensor.dim().0)
        .map(|index| batch_entry_to_image(tensor, index, normalization))
        .collect()
}

fn batch_entry_to_image(
    tensor: &Array4<f32>,
    index: usize,
    normalization: PixelNormalization,
) -> Result<RgbImage> {
    let mut chw = tensor.index_axis(Axis(0), index).to_owned();
    for (mut plane, mean) in chw.outer_iter_mut().zip(channel_means(normalization)) {
        plane.mapv_inplace(|v| v + mean);
    }
    chw_to_rgb(chw.view(), channel_order(normalization))
}

/// Resize `image` back to `original` dimensions when they differ.
pub fn restore_size(image: RgbImage, original: (u32, u32), quality: ResizeQuality) -> RgbImage {
    let (width, height) = original;
    if image.dimensions() == original || width == 0 || height == 0 {
        return image;
    }
    imageops::resize(&image, width, height, resize_filter(quality))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{PreprocessConfig, preprocess_dynamic_image};
    use image::{DynamicImage, Rgb};

    fn sample() -> RgbImage {
        RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 15) as u8, (y * 15) as u8, 77]))
    }

    #[test]
    fn inverts_preprocessing() {
        for normalization in [PixelNormalization::Caffe, PixelNormalization::Raw] {
            let config = PreprocessConfig {
                short_side: 0,
                normalization,
                ..PreprocessConfig::default()
            };
            let prep = preprocess_dynamic_image(&DynamicImage::ImageRgb8(sample()), &config).unwrap();
            let restored = tensor_to_image(&prep.tensor, normalization).unwrap();
            assert_eq!(restored, sample());
        }
    }

    #[test]
    fn rejects_non_rgb_tensors() {
        assert!(tensor_to_image(&Array4::zeros((1, 4, 2, 2)), PixelNormalization::Raw).is_err());
        assert!(tensor_to_image(&Array4::zeros((0, 3, 2, 2)), PixelNormalization::Raw).is_err());
    }

    #[test]
    fn converts_each_batch_entry() {
        let mut tensor = Array4::<f32>::zeros((2, 3, 2, 2));
        tensor.index_axis_mut(Axis(0), 1).fill(255.0);
        let images = tensor_to_images(&tensor, PixelNormalization::Raw).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(images[1].get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn restore_size_resizes_only_when_needed() {
        let image = sample();
        let same = restore_size(image.clone(), (16, 16), ResizeQuality::Quality);
        assert_eq!(same, image);
        let resized = restore_size(image, (30, 15), ResizeQuality::Speed);
        assert_eq!(resized.dimensions(), (30, 15));
    }
}
