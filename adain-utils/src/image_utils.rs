use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::{Array3, ArrayView3};

/// Channel ordering used when laying an RGB image out as a CHW array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    /// Red and blue swapped, as Caffe-trained VGG weights expect.
    Bgr,
}

impl ChannelOrder {
    /// Source RGB channel index feeding output plane `plane`.
    fn source_channel(self, plane: usize) -> usize {
        match self {
            ChannelOrder::Rgb => plane,
            ChannelOrder::Bgr => 2 - plane,
        }
    }
}

/// Load an image from disk into memory.
///
/// # Arguments
///
/// * `path` - The path to the image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Resize an image to exactly `width` x `height` with the provided filter.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Lay an RGB image out as a `[3, H, W]` float array in the requested channel order.
///
/// Values stay in the `0.0..=255.0` range; callers apply any mean subtraction.
pub fn rgb_to_chw(image: &RgbImage, order: ChannelOrder) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for plane in 0..3 {
            array[(plane, yi, xi)] = pixel[order.source_channel(plane)] as f32;
        }
    }
    array
}

/// Convert a `[3, H, W]` array back into an RGB image, rounding and clamping to `0..=255`.
pub fn chw_to_rgb(array: ArrayView3<'_, f32>, order: ChannelOrder) -> Result<RgbImage> {
    let shape = array.shape();
    anyhow::ensure!(
        shape[0] == 3,
        "expected 3 channel planes, got {}",
        shape[0]
    );
    let (height, width) = (shape[1], shape[2]);
    anyhow::ensure!(
        height > 0 && width > 0,
        "cannot build an image with zero dimensions ({width}x{height})"
    );
    let width_u32 = u32::try_from(width).context("image width exceeds u32")?;
    let height_u32 = u32::try_from(height).context("image height exceeds u32")?;

    let mut image = RgbImage::new(width_u32, height_u32);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (xi, yi) = (x as usize, y as usize);
        for plane in 0..3 {
            let value = array[(plane, yi, xi)];
            let value = if value.is_finite() { value } else { 0.0 };
            pixel[order.source_channel(plane)] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(image)
}
