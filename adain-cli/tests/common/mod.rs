//! Common helpers for CLI integration tests.
#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".."))
}

/// Workspace-relative model file, if it has been downloaded.
pub fn find_model(relative: &str) -> Option<PathBuf> {
    let candidates = [PathBuf::from(relative), workspace_root().join(relative)];
    candidates.into_iter().find(|p| p.exists())
}

pub fn fixture_image(name: &str) -> PathBuf {
    workspace_root().join("fixtures/images").join(name)
}

/// Run the CLI binary with `args`.
pub fn run_cli<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_adain-cli"))
        .args(args)
        .output()
        .expect("execute CLI")
}

/// Resolve both pretrained models or skip the calling test.
#[macro_export]
macro_rules! models_or_skip {
    () => {{
        let encoder = match $crate::common::find_model("models/vgg19.onnx") {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: encoder model not found");
                return;
            }
        };
        let decoder = match $crate::common::find_model("models/adain_decoder.onnx") {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: decoder model not found");
                return;
            }
        };
        (encoder, decoder)
    }};
}

/// Macro to assert CLI success and print stderr on failure.
#[macro_export]
macro_rules! assert_cli_success {
    ($output:expr, $msg:literal) => {{
        if !$output.status.success() {
            eprintln!("CLI stderr: {}", String::from_utf8_lossy(&$output.stderr));
        }
        assert!($output.status.success(), $msg);
    }};
}
