//! Scratch directories under the build tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// Create `<parent_dir>/<name>` fresh, removing whatever an earlier run left.
///
/// ```ignore
/// let staging = prepare_work_dir(&output_dir, "initramfs-root")?;
/// ```
pub fn prepare_work_dir(parent_dir: &Path, name: &str) -> Result<PathBuf> {
    let work_dir = parent_dir.join(name);

    if work_dir.exists() {
        make_writable(&work_dir);
        fs::remove_dir_all(&work_dir).with_path(&work_dir)?;
    }
    fs::create_dir_all(&work_dir).with_path(&work_dir)?;

    Ok(work_dir)
}

/// Remove a work directory, ignoring errors.
pub fn cleanup_work_dir(path: &Path) {
    make_writable(path);
    let _ = fs::remove_dir_all(path);
}

/// Materialized trees can contain read-only directories (`proc`, `sys`),
/// which block removal of their children for non-root users.
fn make_writable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_dir() {
            let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(0o755));
        }
    }
}
