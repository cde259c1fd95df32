//! CPU tensor layers used by the decoder.
//!
//! All layers operate on NCHW `f32` arrays.

mod conv2d;
mod reflection_pad;
mod upsample;

pub use conv2d::{ActivationKind, Conv2d};
pub use reflection_pad::ReflectionPad;
pub use upsample::Upsample;
