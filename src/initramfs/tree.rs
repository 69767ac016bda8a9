//! In-memory model of the initramfs root filesystem.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub const DIR_MODE: u32 = 0o755;
pub const EXEC_MODE: u32 = 0o755;
pub const FILE_MODE: u32 = 0o644;

const MAX_SYMLINK_HOPS: usize = 32;

/// Where a regular file's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Read from the host at pack time.
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Char,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    pub kind: DeviceKind,
    pub major: u32,
    pub minor: u32,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory { mode: u32 },
    File { source: FileSource, mode: u32 },
    Symlink { target: String },
    Device(DeviceNode),
}

impl Entry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Entry::Directory { .. } => "directory",
            Entry::File { .. } => "file",
            Entry::Symlink { .. } => "symlink",
            Entry::Device(_) => "device",
        }
    }
}

/// Root filesystem as a map from normalized relative path to entry.
///
/// Keys never start with `/` and contain no `.` or `..` components. Iteration
/// is in lexical key order, which puts every directory before its children.
/// Adding an entry implicitly adds its missing parent directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemTree {
    entries: BTreeMap<String, Entry>,
}

/// Normalize a path to the tree's key form.
pub fn normalize(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s),
                None => return Err(Error::tree(path, "path is not valid UTF-8")),
            },
            Component::ParentDir | Component::Prefix(_) => {
                return Err(Error::tree(path, "path escapes the tree root"))
            }
        }
    }
    if parts.is_empty() {
        return Err(Error::tree(path, "path refers to the tree root"));
    }
    Ok(parts.join("/"))
}

fn parent_of(key: &str) -> Option<&str> {
    key.rsplit_once('/').map(|(parent, _)| parent)
}

impl FilesystemTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Entry> {
        normalize(path).ok().and_then(|key| self.entries.get(&key))
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// All entries in lexical path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn ensure_parents(&mut self, key: &str) -> Result<()> {
        let mut ancestors = Vec::new();
        let mut current = parent_of(key);
        while let Some(dir) = current {
            ancestors.push(dir);
            current = parent_of(dir);
        }
        for dir in ancestors.into_iter().rev() {
            match self.entries.get(dir) {
                None => {
                    self.entries
                        .insert(dir.to_string(), Entry::Directory { mode: DIR_MODE });
                }
                Some(Entry::Directory { .. }) => {}
                Some(other) => {
                    return Err(Error::tree(
                        dir,
                        format!("parent of '{}' is a {}, not a directory", key, other.kind_name()),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Create a directory if absent.
    pub fn add_dir(&mut self, path: impl AsRef<Path>, mode: u32) -> Result<()> {
        let key = normalize(path)?;
        self.ensure_parents(&key)?;
        match self.entries.get(&key) {
            None => {
                self.entries.insert(key, Entry::Directory { mode });
                Ok(())
            }
            Some(Entry::Directory { .. }) => Ok(()),
            Some(other) => Err(Error::tree(
                &key,
                format!("cannot create directory over existing {}", other.kind_name()),
            )),
        }
    }

    /// Create a directory, or change the mode of the one already there.
    pub fn set_dir(&mut self, path: impl AsRef<Path>, mode: u32) -> Result<()> {
        let key = normalize(path)?;
        if let Some(Entry::Directory { mode: existing }) = self.entries.get_mut(&key) {
            *existing = mode;
            return Ok(());
        }
        self.add_dir(&key, mode)
    }

    /// Insert or replace a non-directory entry.
    fn put(&mut self, key: String, entry: Entry) -> Result<()> {
        self.ensure_parents(&key)?;
        if let Some(Entry::Directory { .. }) = self.entries.get(&key) {
            return Err(Error::tree(
                &key,
                format!("cannot replace a directory with a {}", entry.kind_name()),
            ));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Add or replace a regular file.
    pub fn add_file(&mut self, path: impl AsRef<Path>, source: FileSource, mode: u32) -> Result<()> {
        let key = normalize(path)?;
        self.put(key, Entry::File { source, mode })
    }

    /// Add or replace a symlink. The target is stored verbatim.
    pub fn add_symlink(&mut self, path: impl AsRef<Path>, target: impl Into<String>) -> Result<()> {
        let key = normalize(path)?;
        let target = target.into();
        if target.is_empty() {
            return Err(Error::tree(&key, "symlink target is empty"));
        }
        self.put(key, Entry::Symlink { target })
    }

    /// Create a device node if nothing exists at the path yet.
    ///
    /// Returns `true` when the node was created.
    pub fn add_device(&mut self, path: impl AsRef<Path>, node: DeviceNode) -> Result<bool> {
        let key = normalize(path)?;
        if self.entries.contains_key(&key) {
            return Ok(false);
        }
        self.put(key, Entry::Device(node))?;
        Ok(true)
    }

    /// Resolve `key` one component at a time, following every symlink on the
    /// way, including symlinked directories in the middle of a target.
    ///
    /// Returns the key of the entry finally reached; the empty string is the
    /// tree root. The error is the reason resolution stopped.
    fn resolve(&self, key: &str) -> std::result::Result<String, String> {
        let mut hops = 0;
        let mut resolved: Vec<String> = Vec::new();
        let mut pending: VecDeque<String> = key.split('/').map(str::to_string).collect();

        while let Some(part) = pending.pop_front() {
            if part.is_empty() || part == "." {
                continue;
            }
            if part == ".." {
                if resolved.pop().is_none() {
                    return Err("escapes the tree root".to_string());
                }
                continue;
            }
            resolved.push(part);

            let current = resolved.join("/");
            match self.entries.get(&current) {
                Some(Entry::Symlink { target }) => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err("too many levels of symbolic links".to_string());
                    }
                    resolved.pop();
                    if target.starts_with('/') {
                        resolved.clear();
                    }
                    let rest = std::mem::take(&mut pending);
                    pending = target.split('/').map(str::to_string).collect();
                    pending.extend(rest);
                }
                Some(Entry::Directory { .. }) => {}
                Some(other) => {
                    if pending.iter().any(|p| !p.is_empty() && p != ".") {
                        return Err(format!("'{}' is a {}, not a directory", current, other.kind_name()));
                    }
                }
                None => return Err(format!("'{}' does not exist in the tree", current)),
            }
        }
        Ok(resolved.join("/"))
    }

    /// Check that every symlink resolves to an entry inside the tree.
    pub fn validate(&self) -> Result<()> {
        for (key, entry) in &self.entries {
            if let Entry::Symlink { target } = entry {
                self.resolve(key).map_err(|reason| {
                    Error::tree(key, format!("symlink target '{}': {}", target, reason))
                })?;
            }
        }
        Ok(())
    }
}
