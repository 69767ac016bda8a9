//! Download command - fills the artifact cache.

use anyhow::Result;

use crate::build::BootImageBuilder;
use crate::config::Config;

/// Resolve every artifact without building anything.
pub fn cmd_download(config: &Config) -> Result<()> {
    let builder = BootImageBuilder::new(config.build.clone());
    let artifacts = builder.artifacts();
    println!("Resolving {} artifact(s)...\n", artifacts.len());

    let cached: Vec<bool> = artifacts.iter().map(|a| a.is_cached()).collect();
    let resolved = builder.resolve_artifacts()?;

    let mut paths = vec![&resolved.kernel, &resolved.utility];
    paths.extend(resolved.libraries.iter().map(|l| &l.path));
    for ((artifact, path), was_cached) in artifacts.iter().zip(paths).zip(cached) {
        let status = if was_cached { "cached" } else { "fetched" };
        println!("  {:<16} {} [{}]", artifact.name, path.display(), status);
    }

    println!("\nAll artifacts resolved.");
    Ok(())
}
