//! Clean command - removes build outputs.

use anyhow::Result;

use crate::clean;
use crate::config::Config;

/// Clean target for the clean command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget {
    /// Archive, manifest and staged tree (default)
    Outputs,
    /// Artifact cache
    Downloads,
    /// Everything under the build directory
    All,
}

/// Execute the clean command.
pub fn cmd_clean(config: &Config, target: CleanTarget) -> Result<()> {
    match target {
        CleanTarget::Outputs => clean::clean_outputs(&config.build),
        CleanTarget::Downloads => clean::clean_downloads(&config.build),
        CleanTarget::All => clean::clean_all(&config.build),
    }
}
