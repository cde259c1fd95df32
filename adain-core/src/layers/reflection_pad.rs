use anyhow::Result;
use ndarray::Array4;

/// Mirror padding of the two spatial axes of an NCHW tensor.
///
/// The border sample itself is not repeated: padding `[a, b, c]` by one on each side
/// gives `[b, a, b, c, b]`.
///
/// Field names follow the PyTorch `(left, right, top, bottom)` order: `left`/`right` pad
/// the width axis and `top`/`bottom` the height axis. Keras-style NHWC code that names
/// its first pair after axis 1 pads height instead; uniform padding is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReflectionPad {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl ReflectionPad {
    pub const fn new(left: usize, right: usize, top: usize, bottom: usize) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Same amount on all four sides.
    pub const fn uniform(padding: usize) -> Self {
        Self::new(padding, padding, padding, padding)
    }

    pub fn is_identity(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    /// Shape produced for an NCHW input of shape `input`, validating the pad amounts.
    pub fn output_shape(&self, input: [usize; 4]) -> Result<[usize; 4]> {
        let [n, c, h, w] = input;
        check_extent("height", h, self.top, self.bottom)?;
        check_extent("width", w, self.left, self.right)?;
        Ok([n, c, h + self.top + self.bottom, w + self.left + self.right])
    }

    pub fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = input.dim();
        let [_, _, out_h, out_w] = self.output_shape([n, c, h, w])?;
        if self.is_identity() {
            return Ok(input.clone());
        }

        let rows: Vec<usize> = (0..out_h).map(|y| reflect(y, self.top, h)).collect();
        let cols: Vec<usize> = (0..out_w).map(|x| reflect(x, self.left, w)).collect();
        Ok(Array4::from_shape_fn(
            (n, c, out_h, out_w),
            |(b, ch, y, x)| input[(b, ch, rows[y], cols[x])],
        ))
    }
}

fn check_extent(axis: &str, extent: usize, before: usize, after: usize) -> Result<()> {
    anyhow::ensure!(extent > 0, "cannot pad an empty {axis} axis");
    anyhow::ensure!(
        before < extent && after < extent,
        "reflection padding ({before}, {after}) must be smaller than the {axis} ({extent})"
    );
    Ok(())
}

/// Source index for output position `pos` along an axis of length `len` padded by `pad`
/// in front.
fn reflect(pos: usize, pad: usize, len: usize) -> usize {
    let idx = pos as isize - pad as isize;
    let last = len as isize - 1;
    let mirrored = if idx < 0 {
        -idx
    } else if idx > last {
        2 * last - idx
    } else {
        idx
    };
    mirrored as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn row(values: &[f32]) -> Array4<f32> {
        Array::from_shape_vec((1, 1, 1, values.len()), values.to_vec()).unwrap()
    }

    #[test]
    fn mirrors_without_repeating_edge() {
        let pad = ReflectionPad::new(1, 1, 0, 0);
        let out = pad.forward(&row(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), [2.0, 1.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn asymmetric_padding_uses_each_side() {
        let pad = ReflectionPad::new(2, 1, 0, 0);
        let out = pad.forward(&row(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(
            out.iter().copied().collect::<Vec<_>>(),
            [3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0]
        );
    }

    #[test]
    fn pads_both_spatial_axes() {
        let input = Array::from_shape_vec((1, 1, 2, 2), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let out = ReflectionPad::uniform(1).forward(&input).unwrap();
        assert_eq!(out.dim(), (1, 1, 4, 4));
        let expected: Vec<f32> = vec![
            4.0, 3.0, 4.0, 3.0, //
            2.0, 1.0, 2.0, 1.0, //
            4.0, 3.0, 4.0, 3.0, //
            2.0, 1.0, 2.0, 1.0,
        ];
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn top_bottom_apply_to_height() {
        let input = Array::from_shape_vec((1, 1, 3, 1), vec![1.0f32, 2.0, 3.0]).unwrap();
        let out = ReflectionPad::new(0, 0, 1, 2).forward(&input).unwrap();
        assert_eq!(out.dim(), (1, 1, 6, 1));
        assert_eq!(
            out.iter().copied().collect::<Vec<_>>(),
            [2.0, 1.0, 2.0, 3.0, 2.0, 1.0]
        );
    }

    #[test]
    fn zero_padding_is_identity() {
        let input = Array::from_shape_fn((2, 3, 4, 5), |(a, b, c, d)| (a + b * c + d) as f32);
        let out = ReflectionPad::default().forward(&input).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn rejects_padding_not_smaller_than_axis() {
        let pad = ReflectionPad::uniform(2);
        assert!(pad.forward(&row(&[1.0, 2.0])).is_err());
        assert!(pad.output_shape([1, 1, 5, 2]).is_err());
        assert_eq!(pad.output_shape([1, 8, 5, 3]).unwrap(), [1, 8, 9, 7]);
    }

    #[test]
    fn keeps_batch_and_channels_independent() {
        let input = Array::from_shape_fn((2, 2, 3, 3), |(b, c, y, x)| {
            (b * 100 + c * 10 + y * 3 + x) as f32
        });
        let out = ReflectionPad::uniform(1).forward(&input).unwrap();
        for b in 0..2 {
            for c in 0..2 {
                assert_eq!(out[(b, c, 0, 0)], input[(b, c, 1, 1)]);
                assert_eq!(out[(b, c, 4, 4)], input[(b, c, 1, 1)]);
                assert_eq!(out[(b, c, 2, 2)], input[(b, c, 1, 1)]);
            }
        }
    }
}
