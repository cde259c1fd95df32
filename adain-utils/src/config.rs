//! Shared configuration types consumed across the AdaIN workspace.
//!
//! Settings are plain serde structures persisted as JSON. Every struct uses
//! `#[serde(default)]` so partial files only override what they mention.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Default location of the pretrained VGG19 encoder graph.
pub const DEFAULT_ENCODER_PATH: &str = "models/vgg19.onnx";
/// Default location of the trained decoder weights.
pub const DEFAULT_DECODER_PATH: &str = "models/adain_decoder.onnx";

/// Resize filter preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Smooth resampling (Triangle filter).
    #[default]
    Quality,
    /// Nearest-neighbour resampling.
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Memory layout of the encoder graph's image input and activations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// Channels-last, as produced by Keras/TensorFlow exports.
    #[default]
    Nhwc,
    /// Channels-first, as produced by PyTorch exports.
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhwc" | "channels_last" => Ok(TensorLayout::Nhwc),
            "nchw" | "channels_first" => Ok(TensorLayout::Nchw),
            other => Err(format!("invalid tensor layout '{other}'; expected 'nhwc' or 'nchw'")),
        }
    }
}

/// Storage order of convolution kernels in a weights file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightLayout {
    /// `[out, in, kh, kw]` (ONNX / PyTorch).
    #[default]
    Oihw,
    /// `[kh, kw, in, out]` (Keras / TensorFlow).
    Hwio,
}

impl FromStr for WeightLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oihw" => Ok(WeightLayout::Oihw),
            "hwio" => Ok(WeightLayout::Hwio),
            other => Err(format!("invalid weight layout '{other}'; expected 'oihw' or 'hwio'")),
        }
    }
}

/// Pixel normalisation applied before encoding and undone after decoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelNormalization {
    /// BGR channel order with the ImageNet channel means subtracted.
    #[default]
    Caffe,
    /// RGB in `0..=255`, untouched.
    Raw,
}

impl FromStr for PixelNormalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "caffe" | "vgg" => Ok(PixelNormalization::Caffe),
            "raw" | "none" => Ok(PixelNormalization::Raw),
            other => Err(format!(
                "invalid pixel normalization '{other}'; expected 'caffe' or 'raw'"
            )),
        }
    }
}

/// Which VGG activations the encoder exposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EncoderSettings {
    /// Node names (or name fragments) of the activations to return, shallowest first.
    pub layers: Vec<String>,
    /// Layout of the graph's input tensor.
    pub layout: TensorLayout,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            layers: ["block1_conv1", "block2_conv1", "block3_conv1", "block4_conv1"]
                .into_iter()
                .map(String::from)
                .collect(),
            layout: TensorLayout::Nhwc,
        }
    }
}

/// How decoder initializers are named and laid out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DecoderSettings {
    /// Prefix prepended to every initializer name (`{prefix}conv4_1.weight`).
    pub weight_prefix: String,
    pub weight_layout: WeightLayout,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            weight_prefix: "decoder.".to_string(),
            weight_layout: WeightLayout::Oihw,
        }
    }
}

/// Sizing applied to an image before it enters the encoder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageInputSettings {
    /// Target length of the shorter edge in pixels; `0` keeps the original size.
    pub short_side: u32,
    pub resize_quality: ResizeQuality,
}

impl Default for ImageInputSettings {
    fn default() -> Self {
        Self {
            short_side: 512,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

/// Parameters of the AdaIN transfer itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StylizeSettings {
    /// Style strength in `[0, 1]`; `0` reproduces the content features.
    pub alpha: f32,
    /// Added to the content variance before normalising.
    pub epsilon: f32,
    pub normalization: PixelNormalization,
    /// Resize the decoded image back to the content image's original dimensions.
    pub restore_size: bool,
}

impl Default for StylizeSettings {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            epsilon: 1e-5,
            normalization: PixelNormalization::Caffe,
            restore_size: true,
        }
    }
}

impl StylizeSettings {
    /// Clamp values to usable ranges.
    pub fn sanitize(&mut self) {
        if !self.alpha.is_finite() {
            self.alpha = 1.0;
        }
        self.alpha = self.alpha.clamp(0.0, 1.0);
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            self.epsilon = StylizeSettings::default().epsilon;
        }
    }
}

/// Encoding options for stylized images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputSettings {
    /// Output format: "png", "jpeg", or "webp"
    pub format: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// PNG compression strategy ("fast", "default", "best") or numeric level (0-9)
    pub png_compression: String,
    /// Pick the format from the destination file extension when it names one.
    pub auto_detect_format: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: "png".to_string(),
            jpeg_quality: 90,
            png_compression: "default".to_string(),
            auto_detect_format: true,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`, defaulting to debug.
    pub fn level_filter(&self) -> LevelFilter {
        self.level
            .trim()
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Debug)
    }

    pub fn set_level(&mut self, level: LevelFilter) {
        self.level = level.as_str().to_ascii_lowercase();
    }
}

/// Persistent application settings for the style-transfer front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Path to the VGG19 encoder ONNX graph.
    pub encoder_path: Option<String>,
    /// Path to the ONNX file holding decoder initializers.
    pub decoder_path: Option<String>,
    pub encoder: EncoderSettings,
    pub decoder: DecoderSettings,
    /// Sizing of content images.
    pub content: ImageInputSettings,
    /// Sizing of style images.
    pub style: ImageInputSettings,
    pub stylize: StylizeSettings,
    pub output: OutputSettings,
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            encoder_path: Some(DEFAULT_ENCODER_PATH.into()),
            decoder_path: Some(DEFAULT_DECODER_PATH.into()),
            encoder: EncoderSettings::default(),
            decoder: DecoderSettings::default(),
            content: ImageInputSettings::default(),
            style: ImageInputSettings::default(),
            stylize: StylizeSettings::default(),
            output: OutputSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file, filling missing model paths with defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        settings
            .encoder_path
            .get_or_insert_with(|| DEFAULT_ENCODER_PATH.into());
        settings
            .decoder_path
            .get_or_insert_with(|| DEFAULT_DECODER_PATH.into());
        settings.stylize.sanitize();

        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// Returns the default path for persisted settings (`config/adain_settings.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/adain_settings.json"))
        .unwrap_or_else(|_| PathBuf::from("config/adain_settings.json"))
}
