//! Host tool availability checks.

use crate::artifact::Locator;
use crate::build::{BuildConfig, InitSource};
use crate::process::{self, Cmd};
use crate::qemu::QemuConfig;

use super::types::CheckResult;

fn needs_download(config: &BuildConfig) -> bool {
    let remote = |l: &Locator| matches!(l, Locator::Url(url) if !url.starts_with("file://"));
    remote(&config.kernel.locator)
        || remote(&config.utility.locator)
        || config.libraries.iter().any(|lib| remote(&lib.locator))
}

/// Check the tools this configuration will invoke.
pub fn check_host_tools(config: &BuildConfig, qemu: &QemuConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if needs_download(config) {
        results.push(check_tool_exists("curl", "curl", "Required to download artifacts", true));
    }

    if matches!(config.init, InitSource::Cargo { .. }) {
        results.push(check_tool_exists("cargo", "rustup", "Required to compile init", true));
        results.push(check_rust_target(&config.target));
    }

    results.push(check_tool_exists(
        &qemu.binary,
        "qemu-system-arm",
        "Required for `bootforge run`",
        false,
    ));

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, path.display()),
        None => {
            let msg = format!("Not found. Install '{}'. {}", package, purpose);
            if required {
                CheckResult::fail(tool, msg)
            } else {
                CheckResult::warn(tool, msg)
            }
        }
    }
}

/// The Rust standard library for `target` is installed, as far as rustup knows.
fn check_rust_target(target: &str) -> CheckResult {
    let name = format!("rust target {}", target);
    if !process::exists("rustup") {
        return CheckResult::warn(&name, "rustup not found, cannot verify the target is installed");
    }

    match Cmd::new("rustup")
        .args(["target", "list", "--installed"])
        .allow_fail()
        .run()
    {
        Ok(out) if out.success() && out.stdout.lines().any(|l| l.trim() == target) => {
            CheckResult::pass(&name)
        }
        Ok(out) if out.success() => CheckResult::fail(
            &name,
            format!("Not installed. Run 'rustup target add {}'", target),
        ),
        Ok(out) => CheckResult::warn(&name, format!("rustup failed: {}", out.stderr_trimmed())),
        Err(e) => CheckResult::warn(&name, format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ArtifactSpec;
    use crate::preflight::types::CheckStatus;
    use std::path::PathBuf;

    fn local_config() -> BuildConfig {
        let mut config = BuildConfig::new("/tmp/b", InitSource::Prebuilt(PathBuf::from("/tmp/init")));
        config.kernel = ArtifactSpec::parse("/tmp/Image");
        config.utility = ArtifactSpec::parse("file:///tmp/busybox");
        config
    }

    #[test]
    fn test_local_sources_do_not_need_curl() {
        assert!(!needs_download(&local_config()));
        let mut config = local_config();
        config.kernel = ArtifactSpec::parse("https://example.invalid/Image");
        assert!(needs_download(&config));
    }

    #[test]
    fn test_missing_qemu_is_only_a_warning() {
        let qemu = QemuConfig {
            binary: "qemu-system-does-not-exist".into(),
            ..QemuConfig::default()
        };
        let results = check_host_tools(&local_config(), &qemu);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Warn);
    }
}
