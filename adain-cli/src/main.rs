mod args;
mod config;
mod input;
mod types;

use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use adain_core::{Stylizer, StylizerConfig};
use adain_utils::{
    OutputOptions, configure_telemetry, init_logging, load_image, normalize_path,
    save_dynamic_image, timing_guard,
};
use anyhow::{Context, Result};
use clap::Parser;
use image::DynamicImage;
use log::{debug, info, warn};

use crate::{
    args::StylizeArgs,
    config::{apply_cli_overrides, load_settings},
    input::{StylizeJob, collect_content, plan_jobs},
    types::{LossRecord, StyleRecord, StylizedRecord},
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = StylizeArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );
    debug!("adain-core {}", adain_core::version());
    let run_guard = timing_guard("adain_cli::run", log::Level::Info);

    let content_path = normalize_path(&args.content)?;
    let styles = args
        .style
        .iter()
        .map(normalize_path)
        .collect::<Result<Vec<_>>>()?;
    let contents = collect_content(&content_path)?;
    let jobs = plan_jobs(&contents, &styles, &args.style_weight)?;

    let encoder_path = model_path(settings.encoder_path.as_deref(), "encoder")?;
    let decoder_path = model_path(settings.decoder_path.as_deref(), "decoder")?;
    info!(
        "Loading encoder {} and decoder {}",
        encoder_path.display(),
        decoder_path.display()
    );
    let stylizer = Stylizer::load(
        &encoder_path,
        &decoder_path,
        &StylizerConfig::from(&settings),
    )?;

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            args.output_dir.display()
        )
    })?;
    let output_options = OutputOptions::from_settings(&settings.output);
    let extension = output_options.format.extension();

    let mut style_cache: HashMap<PathBuf, DynamicImage> = HashMap::new();
    for style in &styles {
        let image = load_image(style)?;
        style_cache.insert(style.clone(), image);
    }

    info!(
        "Stylizing {} content image(s) with {} style(s){}...",
        contents.len(),
        styles.len(),
        if args.is_blend() { " (blended)" } else { "" }
    );
    let mut results = Vec::with_capacity(jobs.len());
    let mut failures = 0usize;
    for job in &jobs {
        let destination = args
            .output_dir
            .join(format!("{}.{}", job.output_stem, extension));
        match run_job(
            &stylizer,
            job,
            &style_cache,
            &destination,
            &output_options,
            args.evaluate,
        ) {
            Ok(record) => {
                info!(
                    "{} -> {} ({}x{})",
                    job.content.display(),
                    destination.display(),
                    record.width,
                    record.height
                );
                results.push(record);
            }
            Err(err) => {
                failures += 1;
                warn!("Failed to stylize {}: {err:?}", job.content.display());
            }
        }
    }

    if results.is_empty() && failures > 0 {
        anyhow::bail!("all {failures} stylization job(s) failed");
    }

    if let Some(json_path) = args.json.as_ref() {
        if let Some(parent) = json_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &results)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        info!("Wrote report to {}", json_path.display());
    } else {
        let json = serde_json::to_string_pretty(&results)?;
        println!("{json}");
    }

    let elapsed = run_guard.finish();
    info!("Finished {} of {} job(s) in {elapsed:.2?}", results.len(), jobs.len());
    if failures > 0 {
        warn!("{failures} job(s) failed");
    }
    Ok(())
}

fn model_path(configured: Option<&str>, kind: &str) -> Result<PathBuf> {
    let path = configured.with_context(|| format!("no {kind} model path configured"))?;
    normalize_path(path).with_context(|| format!("{kind} model not available"))
}

fn run_job(
    stylizer: &Stylizer,
    job: &StylizeJob,
    style_cache: &HashMap<PathBuf, DynamicImage>,
    destination: &Path,
    options: &OutputOptions,
    evaluate: bool,
) -> Result<StylizedRecord> {
    let _guard = timing_guard("adain_cli::job", log::Level::Debug);
    let content = load_image(&job.content)?;
    let styles = job
        .styles
        .iter()
        .map(|(path, weight)| {
            style_cache
                .get(path)
                .map(|image| (image, *weight))
                .with_context(|| format!("style {} was not loaded", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let rendered = stylizer.render(&content, &styles)?;
    let losses = if evaluate {
        Some(LossRecord::from(stylizer.evaluate_output(&rendered.output)?))
    } else {
        None
    };

    let (width, height) = rendered.image.dimensions();
    save_dynamic_image(
        &DynamicImage::ImageRgb8(rendered.image),
        destination,
        options,
    )?;

    Ok(StylizedRecord {
        content: job.content.display().to_string(),
        styles: job
            .styles
            .iter()
            .map(|(path, weight)| StyleRecord {
                image: path.display().to_string(),
                weight: *weight,
            })
            .collect(),
        output: destination.display().to_string(),
        width,
        height,
        losses,
    })
}
