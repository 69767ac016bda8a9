//! Build command - builds the kernel + initramfs boot image.

use anyhow::{Context, Result};

use crate::build::{BootImageBuilder, BootManifest};
use crate::config::Config;

/// Options for the build command.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Also write the tree to the staging directory for inspection.
    pub stage: bool,
}

/// Execute the build command and print the resulting manifest.
pub fn cmd_build(config: &Config, options: BuildOptions) -> Result<BootManifest> {
    println!("=== Boot Image Build ({}) ===\n", config.build.profile);

    let mut builder = BootImageBuilder::new(config.build.clone()).with_staging(options.stage);
    let manifest = builder
        .build()
        .with_context(|| format!("Build {}", builder.state()))?;

    println!("\nBoot image ready:");
    println!("  Kernel:    {}", manifest.kernel_image.display());
    println!("  Initramfs: {}", manifest.initramfs_archive.display());
    println!("  SHA-256:   {}", manifest.archive_sha256);
    println!("  Cmdline:   {}", manifest.boot_command_line);
    if options.stage {
        println!("  Staged at: {}", config.build.staging_dir().display());
    }
    println!("  Manifest:  {}", config.build.manifest_path().display());

    Ok(manifest)
}
