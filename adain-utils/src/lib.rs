//! Common helpers shared across the AdaIN crates.

/// Persisted settings for models, sizing, transfer strength, and output.
pub mod config;
/// Test fixture path resolution.
pub mod fixtures;
/// Image loading, resizing, and CHW tensor conversion.
pub mod image_utils;
/// Encoding and writing of result images.
pub mod output;
/// Scoped timing logs.
pub mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;

pub use config::{
    AppSettings, PixelNormalization, ResizeQuality, TensorLayout, WeightLayout,
};
pub use fixtures::{fixture_path, fixtures_dir, load_fixture_image};
pub use image_utils::{ChannelOrder, chw_to_rgb, load_image, resize_image, rgb_to_chw};
pub use output::{ImageFormatHint, OutputOptions, PngCompression, save_dynamic_image};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once for the CLI and tests.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` applies. The telemetry target
/// is always let through so [`configure_telemetry`] alone decides whether timings print.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    // A second initialisation (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    path.canonicalize()
        .with_context(|| format!("failed to canonicalize {}", path.display()))
}
