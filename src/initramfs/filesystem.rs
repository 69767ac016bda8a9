//! Tree construction steps, run in a fixed order.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::build::BuildConfig;
use crate::error::{Error, IoResultExt, Result};

use super::devices::device_nodes;
use super::tree::{FileSource, FilesystemTree, DIR_MODE, EXEC_MODE};

/// Directories every initramfs starts with.
pub const SKELETON_DIRS: &[&str] = &["bin", "sbin", "dev", "proc", "sys", "tmp", "run", "etc", "lib"];

/// A shared library after artifact resolution.
#[derive(Debug, Clone)]
pub struct ResolvedLibrary {
    /// Name the dynamic linker looks for (`libc.so.6`).
    pub soname: String,
    pub path: PathBuf,
}

/// Local paths of every fetched artifact the tree needs.
#[derive(Debug, Clone)]
pub struct ResolvedArtifacts {
    pub kernel: PathBuf,
    pub utility: PathBuf,
    pub libraries: Vec<ResolvedLibrary>,
}

/// Build the initramfs tree.
///
/// Steps: skeleton, `/init`, utility + command aliases, shared libraries,
/// overlay (skipped when the directory does not exist), device nodes. The
/// finished tree is validated so every symlink resolves inside it.
pub fn build_tree(
    config: &BuildConfig,
    init_binary: &Path,
    artifacts: &ResolvedArtifacts,
    overlay: Option<&Path>,
) -> Result<FilesystemTree> {
    let mut tree = FilesystemTree::new();

    create_skeleton(&mut tree)?;
    place_init(&mut tree, init_binary)?;
    place_utility(
        &mut tree,
        &config.utility_name,
        &artifacts.utility,
        &config.essential_commands,
    )?;
    place_libraries(&mut tree, &artifacts.libraries, config.lib_subdir.as_deref())?;
    if let Some(dir) = overlay {
        apply_overlay(&mut tree, dir)?;
    }
    create_device_nodes(&mut tree)?;

    tree.validate()?;
    tracing::info!(entries = tree.len(), "filesystem tree ready");
    Ok(tree)
}

fn require_file(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).tree_ctx(path)?;
    if !meta.is_file() {
        return Err(Error::tree(path, "required input is not a regular file"));
    }
    Ok(())
}

fn create_skeleton(tree: &mut FilesystemTree) -> Result<()> {
    for dir in SKELETON_DIRS {
        let mode = match *dir {
            "tmp" => 0o1777,
            "proc" | "sys" => 0o555,
            _ => DIR_MODE,
        };
        tree.add_dir(dir, mode)?;
    }
    Ok(())
}

fn place_init(tree: &mut FilesystemTree, init_binary: &Path) -> Result<()> {
    require_file(init_binary)?;
    tree.add_file(
        super::INIT_PATH,
        FileSource::Path(init_binary.to_path_buf()),
        EXEC_MODE,
    )
}

fn place_utility(
    tree: &mut FilesystemTree,
    name: &str,
    binary: &Path,
    commands: &[String],
) -> Result<()> {
    require_file(binary)?;
    let utility_path = format!("/bin/{}", name);
    tree.add_file(&utility_path, FileSource::Path(binary.to_path_buf()), EXEC_MODE)?;

    let mut linked = 0;
    for cmd in commands.iter().filter(|c| c.as_str() != name) {
        tree.add_symlink(format!("bin/{}", cmd), utility_path.as_str())?;
        linked += 1;
    }
    tracing::debug!(utility = %name, aliases = linked, "multi-call aliases created");
    Ok(())
}

fn place_libraries(
    tree: &mut FilesystemTree,
    libraries: &[ResolvedLibrary],
    lib_subdir: Option<&str>,
) -> Result<()> {
    for lib in libraries {
        require_file(&lib.path)?;
        let lib_path = format!("/lib/{}", lib.soname);
        tree.add_file(&lib_path, FileSource::Path(lib.path.clone()), EXEC_MODE)?;

        let basename = lib
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if basename != lib.soname {
            if let Some(subdir) = lib_subdir {
                tree.add_symlink(format!("lib/{}/{}", subdir, lib.soname), lib_path.as_str())?;
            }
        }
    }
    Ok(())
}

/// Copy an overlay directory over the tree. Overlay entries replace base
/// entries at the same path.
fn apply_overlay(tree: &mut FilesystemTree, overlay: &Path) -> Result<()> {
    if !overlay.exists() {
        tracing::debug!(overlay = %overlay.display(), "overlay directory not present, skipping");
        return Ok(());
    }
    if !overlay.is_dir() {
        return Err(Error::tree(overlay, "overlay is not a directory"));
    }

    let mut count = 0;
    for entry in WalkDir::new(overlay).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(overlay).to_path_buf();
            Error::tree(path, e)
        })?;
        let rel = entry
            .path()
            .strip_prefix(overlay)
            .map_err(|e| Error::tree(entry.path(), e))?;
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).tree_ctx(entry.path())?;
            tree.add_symlink(rel, target.to_string_lossy().into_owned())?;
        } else if file_type.is_dir() || file_type.is_file() {
            let mode = entry
                .metadata()
                .map_err(|e| Error::tree(entry.path(), e))?
                .permissions()
                .mode()
                & 0o7777;
            if file_type.is_dir() {
                tree.set_dir(rel, mode)?;
            } else {
                tree.add_file(rel, FileSource::Path(entry.path().to_path_buf()), mode)?;
            }
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping special file in overlay");
            continue;
        }
        count += 1;
    }

    tracing::info!(overlay = %overlay.display(), entries = count, "overlay applied");
    Ok(())
}

fn create_device_nodes(tree: &mut FilesystemTree) -> Result<()> {
    for (path, node) in device_nodes() {
        if !tree.add_device(path, node)? {
            tracing::debug!(path, "device path already present, leaving it");
        }
    }
    Ok(())
}
