//! The build's output record, consumed by the launch step.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// Paths and kernel command line of a finished boot image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootManifest {
    pub kernel_image: PathBuf,
    pub initramfs_archive: PathBuf,
    pub boot_command_line: String,
    pub archive_sha256: String,
}

impl BootManifest {
    /// Write as pretty JSON, via a temporary sibling and rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize manifest: {}", e)))?;
        let tmp = crate::artifact::sibling_with_suffix(path, ".part");
        fs::write(&tmp, json + "\n").with_path(&tmp)?;
        fs::rename(&tmp, path).with_path(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("invalid manifest {}: {}", path.display(), e)))
    }

    /// Both referenced files still exist.
    pub fn is_complete(&self) -> bool {
        self.kernel_image.is_file() && self.initramfs_archive.is_file()
    }
}
