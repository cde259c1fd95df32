//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use adain_utils::{AppSettings, config::default_settings_path, normalize_path};
use anyhow::{Context, Result};
use log::{info, warn};

use crate::args::StylizeArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &StylizeArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(encoder) = args.encoder.as_ref() {
        settings.encoder_path = Some(encoder.to_string_lossy().into_owned());
    }
    if let Some(decoder) = args.decoder.as_ref() {
        settings.decoder_path = Some(decoder.to_string_lossy().into_owned());
    }

    if let Some(alpha) = args.alpha {
        if !(0.0..=1.0).contains(&alpha) {
            warn!("alpha {alpha} outside [0, 1]; clamping");
        }
        settings.stylize.alpha = alpha;
        settings.stylize.sanitize();
    }
    if let Some(size) = args.content_size {
        settings.content.short_side = size;
    }
    if let Some(size) = args.style_size {
        settings.style.short_side = size;
    }
    if let Some(format) = args.output_format.as_ref() {
        settings.output.format = format.trim().to_ascii_lowercase();
        settings.output.auto_detect_format = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    fn parse(extra: &[&str]) -> StylizeArgs {
        let mut argv = vec!["adain-cli", "--content", "c.png", "--style", "s.png"];
        argv.extend_from_slice(extra);
        StylizeArgs::try_parse_from(argv).expect("parse args")
    }

    #[test]
    fn overrides_replace_settings() {
        let mut settings = AppSettings::default();
        let args = parse(&[
            "--alpha",
            "0.4",
            "--content-size",
            "256",
            "--style-size",
            "0",
            "--encoder",
            "enc.onnx",
            "--output-format",
            "JPEG",
            "--telemetry",
        ]);
        apply_cli_overrides(&mut settings, &args);

        assert!((settings.stylize.alpha - 0.4).abs() < 1e-6);
        assert_eq!(settings.content.short_side, 256);
        assert_eq!(settings.style.short_side, 0);
        assert_eq!(settings.encoder_path.as_deref(), Some("enc.onnx"));
        assert_eq!(settings.output.format, "jpeg");
        assert!(!settings.output.auto_detect_format);
        assert!(settings.telemetry.enabled);
    }

    #[test]
    fn alpha_out_of_range_is_clamped() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(&mut settings, &parse(&["--alpha", "3.5"]));
        assert_eq!(settings.stylize.alpha, 1.0);
    }

    #[test]
    fn telemetry_level_off_disables_telemetry() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(
            &mut settings,
            &parse(&["--telemetry", "--telemetry-level", " OFF "]),
        );
        assert_eq!(settings.telemetry.level, "off");
        assert!(!settings.telemetry.enabled);
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let mut stored = AppSettings::default();
        stored.content.short_side = 320;
        stored.save_to_path(&path).expect("save settings");

        let loaded = load_settings(Some(&path)).expect("load settings");
        assert_eq!(loaded.content.short_side, 320);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let missing = PathBuf::from("no/such/settings.json");
        assert!(load_settings(Some(&missing)).is_err());
    }
}
