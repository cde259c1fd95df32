use anyhow::Result;
use ndarray::Array4;

/// Nearest-neighbour spatial upsampling by an integer factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upsample {
    factor: usize,
}

impl Upsample {
    pub fn nearest(factor: usize) -> Result<Self> {
        anyhow::ensure!(factor >= 1, "upsample factor must be at least 1");
        Ok(Self { factor })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn output_shape(&self, input: [usize; 4]) -> [usize; 4] {
        let [n, c, h, w] = input;
        [n, c, h * self.factor, w * self.factor]
    }

    pub fn forward(&self, input: &Array4<f32>) -> Array4<f32> {
        if self.factor == 1 {
            return input.clone();
        }
        let f = self.factor;
        let (n, c, h, w) = input.dim();
        Array4::from_shape_fn((n, c, h * f, w * f), |(b, ch, y, x)| {
            input[(b, ch, y / f, x / f)]
        })
    }
}
