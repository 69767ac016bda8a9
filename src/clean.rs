//! Build output cleaning.

use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::build::BuildConfig;
use crate::common::temp::cleanup_work_dir;

fn remove_file(path: &Path, label: &str) -> Result<bool> {
    if path.exists() {
        println!("Removing {}...", label);
        fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

/// Remove the archive, manifest and staging tree. Downloads are kept.
pub fn clean_outputs(config: &BuildConfig) -> Result<()> {
    let mut cleaned = false;

    cleaned |= remove_file(&config.manifest_path(), "manifest.json")?;
    cleaned |= remove_file(&config.archive_path(), "initramfs archive")?;
    let part = crate::artifact::sibling_with_suffix(&config.archive_path(), ".part");
    cleaned |= remove_file(&part, "partial archive")?;

    let staging = config.staging_dir();
    if staging.exists() {
        println!("Removing staged tree...");
        cleanup_work_dir(&staging);
        cleaned = true;
    }

    if cleaned {
        println!("Clean complete (downloads preserved).");
    } else {
        println!("No build outputs to clean.");
    }
    Ok(())
}

/// Remove the artifact cache.
pub fn clean_downloads(config: &BuildConfig) -> Result<()> {
    if config.cache_dir.exists() {
        println!("Removing {}...", config.cache_dir.display());
        fs::remove_dir_all(&config.cache_dir)?;
        println!("Downloads removed.");
    } else {
        println!("No downloads to clean.");
    }
    Ok(())
}

/// Remove outputs, downloads and the build directory itself.
pub fn clean_all(config: &BuildConfig) -> Result<()> {
    clean_outputs(config)?;
    clean_downloads(config)?;
    if config.build_dir.exists() {
        cleanup_work_dir(&config.build_dir);
    }
    println!("Everything cleaned.");
    Ok(())
}
