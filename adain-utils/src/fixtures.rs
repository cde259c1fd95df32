use anyhow::{Context, Result};
use image::DynamicImage;
use std::{
    env,
    path::{Path, PathBuf},
};

const FIXTURE_ENV: &str = "ADAIN_FIXTURE_ROOT";

/// Resolve the directory holding test and benchmark fixtures.
///
/// `ADAIN_FIXTURE_ROOT` wins when set; otherwise the nearest `fixtures` directory above
/// this crate's manifest is used.
pub fn fixtures_dir() -> Result<PathBuf> {
    if let Ok(value) = env::var(FIXTURE_ENV) {
        return Ok(PathBuf::from(value));
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .map(|ancestor| ancestor.join("fixtures"))
        .find(|candidate| candidate.is_dir())
        .with_context(|| {
            format!(
                "fixtures directory not found starting from {}",
                manifest_dir.display()
            )
        })
}

/// Resolve a path inside the fixture folder, failing when it does not exist.
pub fn fixture_path<P: AsRef<Path>>(relative: P) -> Result<PathBuf> {
    let relative = relative.as_ref();
    let root = fixtures_dir()?;
    let full = root.join(relative);
    anyhow::ensure!(
        full.exists(),
        "fixture {} does not exist under {}",
        relative.display(),
        root.display()
    );
    Ok(full)
}

/// Load a fixture image.
pub fn load_fixture_image<P: AsRef<Path>>(relative: P) -> Result<DynamicImage> {
    let path = fixture_path(relative)?;
    image::open(&path).with_context(|| format!("failed to open fixture image {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn fixture_path_resolves_existing_file() {
        let path = fixture_path("images/test_pattern.png").expect("pattern should exist");
        assert!(path.ends_with(Path::new("images/test_pattern.png")));
    }

    #[test]
    fn fixture_path_missing_file_errors() {
        assert!(fixture_path("images/missing.png").is_err());
    }

    #[test]
    fn load_fixture_image_reads_pattern() {
        let image = load_fixture_image("images/test_pattern.png").expect("load pattern");
        assert_eq!(image.dimensions(), (16, 16));
    }
}
