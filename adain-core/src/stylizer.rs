//! End-to-end style transfer: encode, align with AdaIN, decode.

use std::{path::Path, sync::Arc};

use adain_utils::{AppSettings, timing_guard};
use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use log::debug;
use ndarray::Array4;

use crate::adain::AdaIn;
use crate::decoder::{Decoder, DecoderWeightsConfig};
use crate::encoder::{EncoderConfig, FeatureExtractor, VggEncoder};
use crate::loss::{StyleLosses, content_loss, style_loss};
use crate::postprocess::{restore_size, tensor_to_image};
use crate::preprocess::{PreprocessConfig, preprocess_dynamic_image};

/// Everything needed to build a [`Stylizer`] from model files.
#[derive(Debug, Clone, PartialEq)]
pub struct StylizerConfig {
    pub encoder: EncoderConfig,
    pub decoder: DecoderWeightsConfig,
    pub alpha: f32,
    pub epsilon: f32,
    pub content: PreprocessConfig,
    pub style: PreprocessConfig,
    /// Resize results back to the content image's original dimensions.
    pub restore_size: bool,
}

impl Default for StylizerConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for StylizerConfig {
    fn from(settings: &AppSettings) -> Self {
        let normalization = settings.stylize.normalization;
        Self {
            encoder: (&settings.encoder).into(),
            decoder: (&settings.decoder).into(),
            alpha: settings.stylize.alpha,
            epsilon: settings.stylize.epsilon,
            content: PreprocessConfig::from_settings(&settings.content, normalization),
            style: PreprocessConfig::from_settings(&settings.style, normalization),
            restore_size: settings.stylize.restore_size,
        }
    }
}

/// Encoder features of one style together with its blend weight.
#[derive(Debug, Clone)]
pub struct WeightedStyle {
    pub weight: f32,
    /// One map per encoder layer, shallowest first.
    pub features: Vec<Array4<f32>>,
}

/// Tensors produced by one transfer.
#[derive(Debug, Clone)]
pub struct StylizeOutput {
    /// Decoded image batch in the encoder's pixel normalisation.
    pub image: Array4<f32>,
    /// AdaIN output fed to the decoder.
    pub target: Array4<f32>,
    pub styles: Vec<WeightedStyle>,
}

/// A stylized image plus the tensors it came from.
#[derive(Debug, Clone)]
pub struct StylizedImage {
    pub image: RgbImage,
    pub output: StylizeOutput,
}

/// Couples an encoder, a decoder and the AdaIN operator.
#[derive(Debug, Clone)]
pub struct Stylizer {
    encoder: Arc<dyn FeatureExtractor>,
    decoder: Decoder,
    adain: AdaIn,
    content: PreprocessConfig,
    style: PreprocessConfig,
    restore_size: bool,
}

impl Stylizer {
    pub fn new(encoder: Arc<dyn FeatureExtractor>, decoder: Decoder, adain: AdaIn) -> Self {
        Self {
            encoder,
            decoder,
            adain,
            content: PreprocessConfig::default(),
            style: PreprocessConfig::default(),
            restore_size: true,
        }
    }

    /// Load the encoder graph and decoder weights from disk.
    pub fn load<E: AsRef<Path>, D: AsRef<Path>>(
        encoder_path: E,
        decoder_path: D,
        config: &StylizerConfig,
    ) -> Result<Self> {
        let _guard = timing_guard("adain_core::stylizer_load", log::Level::Debug);
        let encoder = VggEncoder::load(encoder_path.as_ref(), config.encoder.clone())
            .context("failed to load encoder")?;
        let decoder =
            Decoder::load(decoder_path.as_ref(), &config.decoder).context("failed to load decoder")?;
        let adain = AdaIn::new(config.alpha, config.epsilon)?;
        debug!(
            "Stylizer ready: encoder {}, decoder {}",
            encoder_path.as_ref().display(),
            decoder_path.as_ref().display()
        );
        Ok(Self::new(Arc::new(encoder), decoder, adain)
            .with_preprocess(config.content, config.style)
            .with_restore_size(config.restore_size))
    }

    pub fn with_preprocess(mut self, content: PreprocessConfig, style: PreprocessConfig) -> Self {
        self.content = content;
        self.style = style;
        self
    }

    pub fn with_restore_size(mut self, restore_size: bool) -> Self {
        self.restore_size = restore_size;
        self
    }

    /// Override the blend factor.
    pub fn with_alpha(mut self, alpha: f32) -> Result<Self> {
        self.adain = self.adain.with_alpha(alpha)?;
        Ok(self)
    }

    pub fn adain(&self) -> &AdaIn {
        &self.adain
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn encoder(&self) -> &Arc<dyn FeatureExtractor> {
        &self.encoder
    }

    /// Transfer `style` onto `content`, both preprocessed NCHW image tensors.
    pub fn stylize(&self, content: &Array4<f32>, style: &Array4<f32>) -> Result<StylizeOutput> {
        self.stylize_blend(content, &[(style, 1.0)])
    }

    /// Transfer a weighted mix of styles onto `content`.
    pub fn stylize_blend(
        &self,
        content: &Array4<f32>,
        styles: &[(&Array4<f32>, f32)],
    ) -> Result<StylizeOutput> {
        let _guard = timing_guard("adain_core::stylize", log::Level::Debug);
        anyhow::ensure!(!styles.is_empty(), "at least one style image is required");

        let content_features = deepest(self.encoder.extract(content)?)?;
        let styles = styles
            .iter()
            .map(|&(style, weight)| {
                Ok(WeightedStyle {
                    weight,
                    features: self.encoder.extract(style)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let deepest_styles = styles
            .iter()
            .map(|style| style.features.last().context("encoder returned no feature maps"))
            .collect::<Result<Vec<_>>>()?;
        let weights: Vec<f32> = styles.iter().map(|style| style.weight).collect();
        let target = self
            .adain
            .interpolate(&content_features, &deepest_styles, &weights)?;

        let image = self.decoder.forward(&target)?;
        Ok(StylizeOutput {
            image,
            target,
            styles,
        })
    }

    /// Content and style loss of a decoded image against a content target and style features.
    pub fn evaluate(
        &self,
        image: &Array4<f32>,
        content_target: &Array4<f32>,
        style_features: &[Array4<f32>],
    ) -> Result<StyleLosses> {
        let _guard = timing_guard("adain_core::evaluate", log::Level::Debug);
        let features = self.encoder.extract(image)?;
        let content = content_loss(
            features.last().context("encoder returned no feature maps")?,
            content_target,
        )?;
        let style = style_loss(&features, style_features)?;
        Ok(StyleLosses { content, style })
    }

    /// Losses of a transfer; blended styles contribute by normalised weight.
    pub fn evaluate_output(&self, output: &StylizeOutput) -> Result<StyleLosses> {
        let features = self.encoder.extract(&output.image)?;
        let content = content_loss(
            features.last().context("encoder returned no feature maps")?,
            &output.target,
        )?;

        let total: f32 = output.styles.iter().map(|style| style.weight).sum();
        anyhow::ensure!(total > 0.0, "style weights must have a positive sum");
        let mut style = 0.0;
        for entry in &output.styles {
            style += entry.weight / total * style_loss(&features, &entry.features)?;
        }
        Ok(StyleLosses { content, style })
    }

    /// Stylize decoded images end to end.
    pub fn stylize_images(&self, content: &DynamicImage, style: &DynamicImage) -> Result<RgbImage> {
        Ok(self.render(content, &[(style, 1.0)])?.image)
    }

    /// Preprocess, transfer a weighted mix of styles, and convert the result to an image.
    pub fn render(
        &self,
        content: &DynamicImage,
        styles: &[(&DynamicImage, f32)],
    ) -> Result<StylizedImage> {
        let content_prep = preprocess_dynamic_image(content, &self.content)?;
        let style_tensors = styles
            .iter()
            .map(|&(style, weight)| Ok((preprocess_dynamic_image(style, &self.style)?.tensor, weight)))
            .collect::<Result<Vec<_>>>()?;
        let style_refs: Vec<(&Array4<f32>, f32)> =
            style_tensors.iter().map(|(tensor, weight)| (tensor, *weight)).collect();

        let output = self.stylize_blend(&content_prep.tensor, &style_refs)?;
        let mut image = tensor_to_image(&output.image, self.content.normalization)?;
        if self.restore_size {
            image = restore_size(
                image,
                content_prep.original_size,
                self.content.resize_quality,
            );
        }
        Ok(StylizedImage { image, output })
    }
}

fn deepest(mut features: Vec<Array4<f32>>) -> Result<Array4<f32>> {
    features.pop().context("encoder returned no feature maps")
}
