//! Show command - displays information.

use anyhow::{bail, Result};

use crate::archive::{self, ArchiveEntry};
use crate::build::BootManifest;
use crate::config::Config;

/// Show target for the show command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the last build manifest
    Manifest,
    /// List the initramfs archive
    Archive,
}

/// One `ls -l` style line for an archive entry.
pub fn format_entry(entry: &ArchiveEntry) -> String {
    let detail = if entry.is_symlink() {
        format!(" -> {}", entry.symlink_target().unwrap_or("?"))
    } else if entry.is_char_device() || entry.type_char() == 'b' {
        format!(" ({}, {})", entry.rdev_major, entry.rdev_minor)
    } else if entry.is_file() {
        format!(" [{} bytes]", entry.data.len())
    } else {
        String::new()
    };
    format!("{}{:04o} /{}{}", entry.type_char(), entry.permissions(), entry.name, detail)
}

/// Execute the show command.
pub fn cmd_show(config: &Config, target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Manifest => {
            let path = config.build.manifest_path();
            if !path.exists() {
                bail!("Manifest not found. Run 'bootforge build' first.");
            }
            let manifest = BootManifest::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        ShowTarget::Archive => {
            let path = config.build.archive_path();
            if !path.exists() {
                bail!("Archive not found. Run 'bootforge build' first.");
            }
            let entries = archive::unpack(&path)?;
            for entry in &entries {
                println!("{}", format_entry(entry));
            }
            println!("\n{} entries in {}", entries.len(), path.display());
        }
    }
    Ok(())
}
