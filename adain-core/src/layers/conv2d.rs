use adain_utils::WeightLayout;
use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Axis, s};
use rayon::prelude::*;

/// Activation fused after a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    Relu,
}

/// Unpadded 2D convolution over NCHW tensors.
///
/// Padding is left to a preceding [`ReflectionPad`](super::ReflectionPad). Each batch entry
/// is lowered to an im2col matrix and multiplied against the flattened kernel; batch
/// entries run in parallel.
#[derive(Debug, Clone)]
pub struct Conv2d {
    /// Kernel flattened to `[out, in * kh * kw]`.
    weights: Array2<f32>,
    bias: Array1<f32>,
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: usize,
    activation: Option<ActivationKind>,
}

impl Conv2d {
    /// Build a convolution from an `[out, in, kh, kw]` kernel.
    pub fn new(
        weights: Array4<f32>,
        bias: Array1<f32>,
        activation: Option<ActivationKind>,
    ) -> Result<Self> {
        let (out_channels, in_channels, kh, kw) = weights.dim();
        anyhow::ensure!(
            out_channels > 0 && in_channels > 0 && kh > 0 && kw > 0,
            "convolution kernel has an empty dimension ({:?})",
            weights.shape()
        );
        anyhow::ensure!(
            bias.len() == out_channels,
            "bias length {} does not match {} output channels",
            bias.len(),
            out_channels
        );

        let weights = weights
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((out_channels, in_channels * kh * kw))
            .context("failed to flatten convolution kernel")?;

        Ok(Self {
            weights,
            bias,
            in_channels,
            out_channels,
            kernel: (kh, kw),
            stride: 1,
            activation,
        })
    }

    /// Build a convolution from a kernel stored in `layout`.
    pub fn from_weights(
        weights: Array4<f32>,
        bias: Array1<f32>,
        layout: WeightLayout,
        activation: Option<ActivationKind>,
    ) -> Result<Self> {
        let oihw = match layout {
            WeightLayout::Oihw => weights,
            WeightLayout::Hwio => weights.permuted_axes([3, 2, 0, 1]),
        };
        Self::new(oihw, bias, activation)
    }

    pub fn with_stride(mut self, stride: usize) -> Result<Self> {
        anyhow::ensure!(stride > 0, "convolution stride must be positive");
        self.stride = stride;
        Ok(self)
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        self.kernel
    }

    pub fn activation(&self) -> Option<ActivationKind> {
        self.activation
    }

    /// Shape produced for an NCHW input of shape `input`.
    pub fn output_shape(&self, input: [usize; 4]) -> Result<[usize; 4]> {
        let [n, c, h, w] = input;
        let (kh, kw) = self.kernel;
        anyhow::ensure!(
            c == self.in_channels,
            "convolution expects {} input channels, got {}",
            self.in_channels,
            c
        );
        anyhow::ensure!(
            h >= kh && w >= kw,
            "input {h}x{w} is smaller than the {kh}x{kw} kernel"
        );
        Ok([
            n,
            self.out_channels,
            (h - kh) / self.stride + 1,
            (w - kw) / self.stride + 1,
        ])
    }

    pub fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = input.dim();
        let [_, _, out_h, out_w] = self.output_shape([n, c, h, w])?;

        let samples: Vec<ArrayView3<'_, f32>> = input.outer_iter().collect();
        let outputs = samples
            .into_par_iter()
            .map(|sample| self.forward_sample(sample, out_h, out_w))
            .collect::<Result<Vec<Array3<f32>>>>()?;

        let views: Vec<ArrayView3<'_, f32>> = outputs.iter().map(|o| o.view()).collect();
        ndarray::stack(Axis(0), &views).context("failed to stack convolution outputs")
    }

    fn forward_sample(
        &self,
        sample: ArrayView3<'_, f32>,
        out_h: usize,
        out_w: usize,
    ) -> Result<Array3<f32>> {
        let (kh, kw) = self.kernel;
        let stride = self.stride;
        let span_h = (out_h - 1) * stride + 1;
        let span_w = (out_w - 1) * stride + 1;

        let mut columns = Array2::<f32>::zeros((self.in_channels * kh * kw, out_h * out_w));
        for ic in 0..self.in_channels {
            for ky in 0..kh {
                for kx in 0..kw {
                    let row = (ic * kh + ky) * kw + kx;
                    let window =
                        sample.slice(s![ic, ky..ky + span_h;stride, kx..kx + span_w;stride]);
                    columns
                        .row_mut(row)
                        .iter_mut()
                        .zip(window.iter())
                        .for_each(|(dst, src)| *dst = *src);
                }
            }
        }

        let mut output = self.weights.dot(&columns);
        output += &self.bias.view().insert_axis(Axis(1));
        if let Some(ActivationKind::Relu) = self.activation {
            output.mapv_inplace(|v| v.max(0.0));
        }
        output
            .into_shape_with_order((self.out_channels, out_h, out_w))
            .context("failed to reshape convolution output")
    }
}
