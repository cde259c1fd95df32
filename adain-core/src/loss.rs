//! Perceptual losses used to score a stylized result.
//!
//! Both losses compare encoder features: the content loss against the AdaIN target, the
//! style loss against channel statistics of the style image at every encoder layer.

use anyhow::Result;
use ndarray::{Array2, Array4};

use crate::adain::channel_statistics;

/// Content and style loss of one stylized output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StyleLosses {
    pub content: f32,
    pub style: f32,
}

impl StyleLosses {
    /// `content + style_weight * style`.
    pub fn total(&self, style_weight: f32) -> f32 {
        self.content + style_weight * self.style
    }
}

/// Mean squared error between two feature maps of identical shape.
pub fn content_loss(output: &Array4<f32>, target: &Array4<f32>) -> Result<f32> {
    anyhow::ensure!(
        output.shape() == target.shape(),
        "content loss needs matching shapes, got {:?} and {:?}",
        output.shape(),
        target.shape()
    );
    anyhow::ensure!(!output.is_empty(), "content loss of empty feature maps");
    let sum: f32 = output
        .iter()
        .zip(target.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    Ok(sum / output.len() as f32)
}

/// Sum over layers of the mean/std mismatch between output and style features.
///
/// Style statistics with batch 1 are compared against every output batch entry.
pub fn style_loss(output: &[Array4<f32>], style: &[Array4<f32>]) -> Result<f32> {
    anyhow::ensure!(
        output.len() == style.len(),
        "style loss needs one style map per output map ({} vs {})",
        output.len(),
        style.len()
    );

    let mut total = 0.0;
    for (layer, (out, sty)) in output.iter().zip(style).enumerate() {
        let out_stats = channel_statistics(out)?;
        let sty_stats = channel_statistics(sty)?;
        anyhow::ensure!(
            out_stats.channels() == sty_stats.channels(),
            "layer {layer}: output has {} channels, style has {}",
            out_stats.channels(),
            sty_stats.channels()
        );
        anyhow::ensure!(
            sty_stats.batch() == out_stats.batch() || sty_stats.batch() == 1,
            "layer {layer}: style batch {} must be 1 or {}",
            sty_stats.batch(),
            out_stats.batch()
        );
        total += broadcast_mse(&out_stats.mean, &sty_stats.mean)
            + broadcast_mse(&out_stats.std, &sty_stats.std);
    }
    Ok(total)
}

fn broadcast_mse(values: &Array2<f32>, reference: &Array2<f32>) -> f32 {
    let (n, c) = values.dim();
    let shared = reference.nrows() == 1;
    let mut sum = 0.0;
    for b in 0..n {
        let rb = if shared { 0 } else { b };
        for ch in 0..c {
            let d = values[(b, ch)] - reference[(rb, ch)];
            sum += d * d;
        }
    }
    sum / (n * c).max(1) as f32
}
