//! Write a [`FilesystemTree`] to a host directory for inspection.

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use nix::sys::stat::{makedev, mknod, Mode, SFlag};

use crate::error::{Error, IoResultExt, Result};

use super::tree::{DeviceKind, DeviceNode, Entry, FileSource, FilesystemTree};

/// Outcome of [`FilesystemTree::materialize`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub written: usize,
    /// Device nodes that need root to create. The archive still carries them.
    pub skipped_devices: Vec<String>,
}

impl FilesystemTree {
    /// Write every entry under `root`, which must already exist.
    ///
    /// Device node creation failing with EPERM is recorded and skipped.
    /// Directory modes are applied last so read-only directories don't block
    /// writing their children.
    pub fn materialize(&self, root: &Path) -> Result<MaterializeReport> {
        let mut report = MaterializeReport::default();
        let mut dir_modes = Vec::new();

        for (key, entry) in self.entries() {
            let path = root.join(key);
            match entry {
                Entry::Directory { mode } => {
                    fs::create_dir_all(&path).tree_ctx(&path)?;
                    dir_modes.push((path, *mode));
                }
                Entry::File { source, mode } => {
                    match source {
                        FileSource::Path(src) => {
                            fs::copy(src, &path).tree_ctx(src)?;
                        }
                        FileSource::Bytes(data) => fs::write(&path, data).tree_ctx(&path)?,
                    }
                    fs::set_permissions(&path, fs::Permissions::from_mode(*mode))
                        .tree_ctx(&path)?;
                }
                Entry::Symlink { target } => {
                    symlink(target, &path).tree_ctx(&path)?;
                }
                Entry::Device(node) => {
                    if !create_device(&path, node)? {
                        tracing::warn!(
                            path = %path.display(),
                            "no permission to create device node, skipping"
                        );
                        report.skipped_devices.push(key.to_string());
                        continue;
                    }
                }
            }
            report.written += 1;
        }

        for (path, mode) in dir_modes.into_iter().rev() {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).tree_ctx(&path)?;
        }

        tracing::debug!(
            root = %root.display(),
            written = report.written,
            skipped = report.skipped_devices.len(),
            "tree materialized"
        );
        Ok(report)
    }
}

/// Returns `false` when the caller lacks the privilege to create the node.
fn create_device(path: &Path, node: &DeviceNode) -> Result<bool> {
    let sflag = match node.kind {
        DeviceKind::Char => SFlag::S_IFCHR,
        DeviceKind::Block => SFlag::S_IFBLK,
    };
    let dev = makedev(node.major as u64, node.minor as u64);

    match mknod(path, sflag, Mode::from_bits_truncate(node.mode), dev) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::EPERM) => Ok(false),
        Err(e) => Err(Error::tree(path, e)),
    }
}
