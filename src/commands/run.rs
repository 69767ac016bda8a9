//! Run command - boot the image in QEMU.

use anyhow::Result;

use crate::build::BootManifest;
use crate::config::Config;

use super::build::{cmd_build, BuildOptions};

/// Rebuild so the booted image matches the current configuration.
pub fn prepare_boot(config: &Config) -> Result<BootManifest> {
    cmd_build(config, BuildOptions::default())
}

/// Execute the run command.
pub fn cmd_run(config: &Config) -> Result<()> {
    let manifest = prepare_boot(config)?;
    config.qemu.launch(&manifest)
}
