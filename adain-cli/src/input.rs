//! Input collection and pairing of content with style images.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::debug;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// One stylized output to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct StylizeJob {
    pub content: PathBuf,
    /// Styles with their blend weights; a single entry means plain transfer.
    pub styles: Vec<(PathBuf, f32)>,
    /// Output file stem, unique within one run.
    pub output_stem: String,
}

/// `{content}_stylized_{style}`, with styles joined by `+` when blended.
fn base_stem(content: &Path, styles: &[(PathBuf, f32)]) -> String {
    let styles: Vec<String> = styles.iter().map(|(path, _)| stem(path)).collect();
    format!("{}_stylized_{}", stem(content), styles.join("+"))
}

/// Append `_2`, `_3`, ... to stems already taken in this run.
fn unique_stem(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if taken.insert(candidate.clone()) {
            debug!("Output name {base} already used; writing {candidate}");
            return candidate;
        }
        n += 1;
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// Collect all image paths from a file or directory.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext_lower = ext.to_ascii_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext_lower.as_str()) {
                images.push(entry.path().to_path_buf());
            } else {
                debug!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Collect content images, failing when none are found.
pub fn collect_content(path: &Path) -> Result<Vec<PathBuf>> {
    let images = collect_images(path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: {})",
            path.display(),
            IMAGE_EXTENSIONS.join(", ")
        );
    }
    Ok(images)
}

/// Pair every content image with every style, or with the weighted blend of all styles.
pub fn plan_jobs(contents: &[PathBuf], styles: &[PathBuf], weights: &[f32]) -> Result<Vec<StylizeJob>> {
    anyhow::ensure!(!styles.is_empty(), "at least one --style is required");

    let mut taken = HashSet::new();
    let mut job = |content: &PathBuf, styles: Vec<(PathBuf, f32)>| {
        let output_stem = unique_stem(base_stem(content, &styles), &mut taken);
        StylizeJob {
            content: content.clone(),
            styles,
            output_stem,
        }
    };

    if weights.is_empty() {
        return Ok(contents
            .iter()
            .flat_map(|content| styles.iter().map(move |style| (content, style)))
            .map(|(content, style)| job(content, vec![(style.clone(), 1.0)]))
            .collect());
    }

    anyhow::ensure!(
        weights.len() == styles.len(),
        "got {} --style-weight values for {} styles",
        weights.len(),
        styles.len()
    );
    anyhow::ensure!(
        weights.iter().all(|w| w.is_finite() && *w >= 0.0),
        "style weights must be finite and non-negative"
    );
    anyhow::ensure!(
        weights.iter().sum::<f32>() > 0.0,
        "style weights must have a positive sum"
    );

    let blend: Vec<(PathBuf, f32)> = styles.iter().cloned().zip(weights.iter().copied()).collect();
    Ok(contents
        .iter()
        .map(|content| job(content, blend.clone()))
        .collect())
}
