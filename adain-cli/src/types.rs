//! Serializable report records for adain-cli.

use adain_core::StyleLosses;
use serde::Serialize;

/// One style and the weight it contributed.
#[derive(Debug, Serialize)]
pub struct StyleRecord {
    pub image: String,
    pub weight: f32,
}

/// Losses of one output, with `total = content + style`.
#[derive(Debug, Serialize)]
pub struct LossRecord {
    pub content: f32,
    pub style: f32,
    pub total: f32,
}

/// A serializable representation of one stylized output.
#[derive(Debug, Serialize)]
pub struct StylizedRecord {
    pub content: String,
    pub styles: Vec<StyleRecord>,
    pub output: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub losses: Option<LossRecord>,
}

impl From<StyleLosses> for LossRecord {
    fn from(losses: StyleLosses) -> Self {
        Self {
            content: losses.content,
            style: losses.style,
            total: losses.total(1.0),
        }
    }
}
