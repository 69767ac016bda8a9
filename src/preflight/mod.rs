//! Preflight checks for a boot image build.
//!
//! Validates host tools and build inputs before starting a build.
//! Run with `bootforge preflight` to check everything is ready.

mod host_tools;
mod inputs;
mod types;

use anyhow::{bail, Result};

pub use types::{CheckResult, CheckStatus, PreflightReport};

use crate::config::Config;

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(&config.build, &config.qemu));

    println!("Checking build inputs...");
    checks.extend(inputs::check_inputs(&config.build));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
