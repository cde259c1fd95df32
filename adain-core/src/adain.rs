//! Adaptive instance normalisation.
//!
//! Content features are shifted and scaled per `(batch, channel)` so their spatial mean and
//! standard deviation match those of the style features, then blended with the untouched
//! content by `alpha`.

use anyhow::Result;
use ndarray::{Array2, Array4, s};

/// Per-`(batch, channel)` spatial statistics, each shaped `[batch, channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStats {
    pub mean: Array2<f32>,
    /// Population standard deviation.
    pub std: Array2<f32>,
}

impl ChannelStats {
    pub fn batch(&self) -> usize {
        self.mean.nrows()
    }

    pub fn channels(&self) -> usize {
        self.mean.ncols()
    }
}

/// Mean and population standard deviation of every channel plane.
pub fn channel_statistics(features: &Array4<f32>) -> Result<ChannelStats> {
    let (mean, var) = moments(features)?;
    Ok(ChannelStats {
        mean,
        std: var.mapv(f32::sqrt),
    })
}

fn moments(features: &Array4<f32>) -> Result<(Array2<f32>, Array2<f32>)> {
    let (n, c, h, w) = features.dim();
    let count = h * w;
    anyhow::ensure!(count > 0, "feature map has no spatial extent ({h}x{w})");

    let mut mean = Array2::<f32>::zeros((n, c));
    let mut var = Array2::<f32>::zeros((n, c));
    for b in 0..n {
        for ch in 0..c {
            let plane = features.slice(s![b, ch, .., ..]);
            let mu = plane.sum() / count as f32;
            let sq = plane.fold(0.0f32, |acc, &v| acc + (v - mu) * (v - mu));
            mean[(b, ch)] = mu;
            var[(b, ch)] = sq / count as f32;
        }
    }
    Ok((mean, var))
}

/// AdaIN operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaIn {
    alpha: f32,
    epsilon: f32,
}

impl Default for AdaIn {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            epsilon: 1e-5,
        }
    }
}

impl AdaIn {
    /// `alpha` must lie in `[0, 1]`; `epsilon` is added to the content variance only.
    pub fn new(alpha: f32, epsilon: f32) -> Result<Self> {
        check_alpha(alpha)?;
        anyhow::ensure!(
            epsilon.is_finite() && epsilon >= 0.0,
            "epsilon must be a non-negative finite number, got {epsilon}"
        );
        Ok(Self { alpha, epsilon })
    }

    pub fn with_alpha(self, alpha: f32) -> Result<Self> {
        check_alpha(alpha)?;
        Ok(Self { alpha, ..self })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Align `content` to the statistics of `style`.
    ///
    /// Channel counts must agree. The style batch must equal the content batch or be 1, in
    /// which case it applies to every content entry. Spatial sizes are independent.
    pub fn transfer(&self, content: &Array4<f32>, style: &Array4<f32>) -> Result<Array4<f32>> {
        self.interpolate(content, &[style], &[1.0])
    }

    /// Transfer toward a weighted mix of several styles.
    ///
    /// Weights are normalised to sum to one; they must be non-negative with a positive sum.
    pub fn interpolate(
        &self,
        content: &Array4<f32>,
        styles: &[&Array4<f32>],
        weights: &[f32],
    ) -> Result<Array4<f32>> {
        anyhow::ensure!(!styles.is_empty(), "at least one style feature map is required");
        anyhow::ensure!(
            styles.len() == weights.len(),
            "{} style feature maps but {} weights",
            styles.len(),
            weights.len()
        );
        anyhow::ensure!(
            weights.iter().all(|w| w.is_finite() && *w >= 0.0),
            "style weights must be non-negative, got {weights:?}"
        );
        let total: f32 = weights.iter().sum();
        anyhow::ensure!(total > 0.0, "style weights must have a positive sum");

        let (n, c, _, _) = content.dim();
        let (content_mean, content_var) = moments(content)?;

        // Each style contributes `x * gain + bias`; the weighted mix stays affine in `x`.
        let mut gain = Array2::<f32>::zeros((n, c));
        let mut bias = Array2::<f32>::zeros((n, c));
        for (style, &weight) in styles.iter().zip(weights) {
            let stats = channel_statistics(style)?;
            anyhow::ensure!(
                stats.channels() == c,
                "content has {c} channels but style has {}",
                stats.channels()
            );
            anyhow::ensure!(
                stats.batch() == n || stats.batch() == 1,
                "style batch {} must be 1 or match content batch {n}",
                stats.batch()
            );
            let share = weight / total;
            for b in 0..n {
                let sb = if stats.batch() == 1 { 0 } else { b };
                for ch in 0..c {
                    let scale =
                        stats.std[(sb, ch)] / (content_var[(b, ch)] + self.epsilon).sqrt();
                    gain[(b, ch)] += share * scale;
                    bias[(b, ch)] += share * (stats.mean[(sb, ch)] - content_mean[(b, ch)] * scale);
                }
            }
        }

        let mut output = content.to_owned();
        for b in 0..n {
            for ch in 0..c {
                let g = self.alpha * gain[(b, ch)] + (1.0 - self.alpha);
                let t = self.alpha * bias[(b, ch)];
                output
                    .slice_mut(s![b, ch, .., ..])
                    .mapv_inplace(|v| v * g + t);
            }
        }
        Ok(output)
    }
}

fn check_alpha(alpha: f32) -> Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&alpha),
        "alpha must lie in [0, 1], got {alpha}"
    );
    Ok(())
}
