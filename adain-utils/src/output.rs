//! Encoding and writing of stylized images.
//!
//! Format selection follows the destination extension when auto-detection is on, and
//! otherwise the configured default.

use crate::config::OutputSettings;

use anyhow::{Context, Result};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};
use log::{debug, warn};
use std::{fs, path::Path};

/// Canonical image formats supported by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormatHint {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormatHint {
    /// Determine format from a filesystem extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    /// Preferred file extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

impl std::str::FromStr for ImageFormatHint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

/// Simplified PNG compression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

impl PngCompression {
    /// Parse a strategy name or a zlib-style numeric level.
    pub fn parse(input: &str) -> Self {
        let normalized = input.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "fast" => Self::Fast,
            "best" => Self::Best,
            "default" => Self::Default,
            _ => match normalized.parse::<u8>() {
                Ok(0..=3) => Self::Fast,
                Ok(7..=9) => Self::Best,
                Ok(_) => Self::Default,
                Err(_) => {
                    warn!("Unknown PNG compression '{input}', falling back to default strategy");
                    Self::Default
                }
            },
        }
    }

    fn into_image(self) -> CompressionType {
        match self {
            Self::Fast => CompressionType::Fast,
            Self::Default => CompressionType::Default,
            Self::Best => CompressionType::Best,
        }
    }
}

/// Encoding options resolved from [`OutputSettings`].
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: ImageFormatHint,
    pub auto_detect: bool,
    pub jpeg_quality: u8,
    pub png_compression: PngCompression,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::from_settings(&OutputSettings::default())
    }
}

impl OutputOptions {
    pub fn from_settings(settings: &OutputSettings) -> Self {
        let format = settings.format.parse().unwrap_or_else(|err| {
            warn!("{err}; writing PNG instead");
            ImageFormatHint::Png
        });
        Self {
            format,
            auto_detect: settings.auto_detect_format,
            jpeg_quality: settings.jpeg_quality.clamp(1, 100),
            png_compression: PngCompression::parse(&settings.png_compression),
        }
    }

    /// Format that [`save_dynamic_image`] will use for `path`.
    pub fn resolve_format(&self, path: &Path) -> ImageFormatHint {
        if !self.auto_detect {
            return self.format;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormatHint::from_extension)
            .unwrap_or(self.format)
    }
}

/// Encode `image` and write it to `destination`, creating parent directories as needed.
pub fn save_dynamic_image(
    image: &DynamicImage,
    destination: &Path,
    options: &OutputOptions,
) -> Result<()> {
    if let Some(parent) = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty() && !p.exists())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let format = options.resolve_format(destination);
    debug!(
        "Saving image to {} using {:?} format",
        destination.display(),
        format
    );

    let encoded = match format {
        ImageFormatHint::Png => encode_png(image, options.png_compression)?,
        ImageFormatHint::Jpeg => encode_jpeg(image, options.jpeg_quality)?,
        ImageFormatHint::Webp => encode_webp(image)?,
    };

    fs::write(destination, &encoded)
        .with_context(|| format!("failed to write {}", destination.display()))
}

fn encode_png(image: &DynamicImage, compression: PngCompression) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    PngEncoder::new_with_quality(&mut buffer, compression.into_image(), FilterType::Adaptive)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .context("failed to encode PNG")?;
    Ok(buffer)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .context("failed to encode JPEG")?;
    Ok(buffer)
}

fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    WebPEncoder::new_lossless(&mut buffer)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )
        .context("failed to encode WebP")?;
    Ok(buffer)
}
