//! Checks on the build inputs themselves.

use std::path::Path;

use crate::artifact::Locator;
use crate::build::{BuildConfig, InitSource};

use super::types::CheckResult;

fn check_local(name: &str, locator: &Locator) -> CheckResult {
    match locator.local_path() {
        Some(path) if path.is_file() => CheckResult::pass_with(name, path.display()),
        Some(path) => CheckResult::fail(name, format!("{} not found", path.display())),
        None => CheckResult::pass_with(name, format!("download from {}", locator)),
    }
}

/// Check init source, artifact sources, overlay and output directory.
pub fn check_inputs(config: &BuildConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    results.push(match &config.init {
        InitSource::Prebuilt(path) if path.is_file() => CheckResult::pass_with("init", path.display()),
        InitSource::Prebuilt(path) => {
            CheckResult::fail("init", format!("prebuilt binary {} not found", path.display()))
        }
        InitSource::Cargo { manifest_dir, package, .. } => {
            if manifest_dir.join("Cargo.toml").is_file() {
                CheckResult::pass_with("init", format!("cargo package '{}'", package))
            } else {
                CheckResult::fail(
                    "init",
                    format!("no Cargo.toml in {}", manifest_dir.display()),
                )
            }
        }
    });

    results.push(check_local("kernel", &config.kernel.locator));
    results.push(check_local(&config.utility_name, &config.utility.locator));
    for lib in &config.libraries {
        results.push(check_local(&lib.soname, &lib.locator));
    }

    if let Some(overlay) = &config.overlay {
        results.push(if overlay.is_dir() {
            CheckResult::pass_with("overlay", overlay.display())
        } else {
            CheckResult::warn("overlay", format!("{} does not exist, it will be skipped", overlay.display()))
        });
    }

    results.push(check_writable(&config.build_dir));

    if let Err(e) = config.validate() {
        results.push(CheckResult::fail("configuration", e));
    } else {
        results.push(CheckResult::pass("configuration"));
    }

    results
}

/// The build directory, or its closest existing ancestor, is writable.
fn check_writable(build_dir: &Path) -> CheckResult {
    let existing = build_dir.ancestors().find(|p| p.exists());
    match existing {
        Some(dir) => match std::fs::metadata(dir) {
            Ok(meta) if meta.permissions().readonly() => {
                CheckResult::fail("build directory", format!("{} is read-only", dir.display()))
            }
            Ok(_) => CheckResult::pass_with("build directory", build_dir.display()),
            Err(e) => CheckResult::fail("build directory", e),
        },
        None => CheckResult::fail("build directory", "no existing ancestor"),
    }
}
