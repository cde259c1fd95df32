//! Command-line argument definitions for adain-cli.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Transfer the style of one or more images onto content images with AdaIN.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct StylizeArgs {
    /// Content image file or a directory of images.
    #[arg(short, long)]
    pub content: PathBuf,

    /// Style image. Repeat to stylize with several styles.
    #[arg(short, long, required = true, action = ArgAction::Append)]
    pub style: Vec<PathBuf>,

    /// Blend weight per style, in `--style` order. When given, all styles are mixed into one output.
    #[arg(long = "style-weight", value_name = "WEIGHT", action = ArgAction::Append)]
    pub style_weight: Vec<f32>,

    /// Path to the VGG19 encoder ONNX graph (defaults to settings file).
    #[arg(short, long)]
    pub encoder: Option<PathBuf>,

    /// Path to the ONNX file holding decoder weights (defaults to settings file).
    #[arg(short, long)]
    pub decoder: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/adain_settings.json` when present, otherwise built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for stylized images.
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Style strength between 0 (content only) and 1 (full transfer).
    #[arg(short, long)]
    pub alpha: Option<f32>,

    /// Shorter edge of content images before encoding (0 keeps the original size).
    #[arg(long, value_name = "PIXELS")]
    pub content_size: Option<u32>,

    /// Shorter edge of style images before encoding (0 keeps the original size).
    #[arg(long, value_name = "PIXELS")]
    pub style_size: Option<u32>,

    /// Output image format (png, jpeg, webp).
    #[arg(long, value_name = "FORMAT")]
    pub output_format: Option<String>,

    /// Report content and style losses for every output.
    #[arg(long, action = ArgAction::SetTrue)]
    pub evaluate: bool,

    /// Write the JSON report to this file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

impl StylizeArgs {
    /// Whether the styles are blended into a single output per content image.
    pub fn is_blend(&self) -> bool {
        !self.style_weight.is_empty()
    }
}
