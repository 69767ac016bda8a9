//! Gzip-compressed newc cpio packing of a [`FilesystemTree`].
//!
//! Output is reproducible: entries go out in lexical path order, owner,
//! group and mtime are zero, inode numbers are sequential, and the gzip
//! header carries no timestamp or file name. Packing the same tree twice
//! gives byte-identical archives.

pub mod newc;

use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};

use crate::artifact::sibling_with_suffix;
use crate::cache;
use crate::error::{Error, IoResultExt, Result};
use crate::initramfs::{DeviceKind, Entry, FileSource, FilesystemTree};

pub use newc::ArchiveEntry;
use newc::{Header, NewcWriter};

pub const DEFAULT_GZIP_LEVEL: u32 = 9;

#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    /// 0 (store) through 9 (smallest).
    pub gzip_level: u32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            gzip_level: DEFAULT_GZIP_LEVEL,
        }
    }
}

/// What [`pack`] wrote.
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub path: PathBuf,
    pub entries: usize,
    /// Size of the cpio stream before compression.
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub sha256: String,
}

fn header_for(entry: &Entry) -> Header {
    match entry {
        Entry::Directory { mode } => Header {
            mode: newc::S_IFDIR | (mode & 0o7777),
            nlink: 2,
            ..Header::default()
        },
        Entry::File { mode, .. } => Header {
            mode: newc::S_IFREG | (mode & 0o7777),
            nlink: 1,
            ..Header::default()
        },
        Entry::Symlink { .. } => Header {
            mode: newc::S_IFLNK | 0o777,
            nlink: 1,
            ..Header::default()
        },
        Entry::Device(node) => Header {
            mode: match node.kind {
                DeviceKind::Char => newc::S_IFCHR,
                DeviceKind::Block => newc::S_IFBLK,
            } | (node.mode & 0o7777),
            nlink: 1,
            rdev_major: node.major,
            rdev_minor: node.minor,
        },
    }
}

/// Pack `tree` into a gzip'd newc archive at `output`.
///
/// The archive is written to `<output>.part` and renamed on success, so
/// `output` only ever holds a complete archive.
pub fn pack(tree: &FilesystemTree, output: &Path, options: PackOptions) -> Result<PackSummary> {
    if options.gzip_level > 9 {
        return Err(Error::Config(format!(
            "gzip level {} out of range 0-9",
            options.gzip_level
        )));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).pack_ctx(parent)?;
    }

    let part = sibling_with_suffix(output, ".part");
    let result = write_archive(tree, &part, options);
    let (entries, uncompressed_bytes) = match result {
        Ok(stats) => stats,
        Err(e) => {
            let _ = fs::remove_file(&part);
            return Err(e);
        }
    };
    fs::rename(&part, output).pack_ctx(output)?;

    let compressed_bytes = fs::metadata(output).pack_ctx(output)?.len();
    let sha256 = cache::hash_file(output).pack_ctx(output)?;
    tracing::info!(
        path = %output.display(),
        entries,
        uncompressed_bytes,
        compressed_bytes,
        "archive packed"
    );

    Ok(PackSummary {
        path: output.to_path_buf(),
        entries,
        uncompressed_bytes,
        compressed_bytes,
        sha256,
    })
}

fn write_archive(tree: &FilesystemTree, part: &Path, options: PackOptions) -> Result<(usize, u64)> {
    let file = File::create(part).pack_ctx(part)?;
    let gz = GzBuilder::new()
        .mtime(0)
        .write(BufWriter::new(file), Compression::new(options.gzip_level));
    let mut writer = NewcWriter::new(gz);

    let mut count = 0;
    for (name, entry) in tree.entries() {
        let data = match entry {
            Entry::File { source: FileSource::Path(src), .. } => fs::read(src).pack_ctx(src)?,
            Entry::File { source: FileSource::Bytes(bytes), .. } => bytes.clone(),
            Entry::Symlink { target } => target.as_bytes().to_vec(),
            Entry::Directory { .. } | Entry::Device(_) => Vec::new(),
        };
        writer
            .write_entry(name, header_for(entry), &data)
            .pack_ctx(part)?;
        count += 1;
    }

    let uncompressed = writer.bytes_written();
    let gz = writer.finish().pack_ctx(part)?;
    let buffered = gz.finish().pack_ctx(part)?;
    let file = buffered
        .into_inner()
        .map_err(|e| Error::pack(part, e.error()))?;
    file.sync_all().pack_ctx(part)?;

    Ok((count, uncompressed))
}

/// Decode a gzip'd newc stream into its entries.
pub fn read_entries<R: Read>(reader: R) -> std::result::Result<Vec<ArchiveEntry>, String> {
    let mut bytes = Vec::new();
    GzDecoder::new(reader)
        .read_to_end(&mut bytes)
        .map_err(|e| format!("gzip: {}", e))?;
    newc::parse(&bytes)
}

/// Read back an archive written by [`pack`].
pub fn unpack(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).pack_ctx(path)?;
    read_entries(file).map_err(|reason| Error::pack(path, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initramfs::DeviceNode;
    use tempfile::TempDir;

    fn sample_tree(dir: &Path) -> FilesystemTree {
        let init = dir.join("init-src");
        fs::write(&init, b"\x7fELF init").unwrap();

        let mut tree = FilesystemTree::new();
        tree.add_dir("proc", 0o555).unwrap();
        tree.add_file("init", FileSource::Path(init), 0o755).unwrap();
        tree.add_file("bin/busybox", FileSource::Bytes(b"bb".to_vec()), 0o755)
            .unwrap();
        tree.add_symlink("bin/sh", "/bin/busybox").unwrap();
        tree.add_device(
            "dev/console",
            DeviceNode { kind: DeviceKind::Char, major: 5, minor: 1, mode: 0o622 },
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_pack_and_read_back() {
        let temp = TempDir::new().unwrap();
        let tree = sample_tree(temp.path());
        let out = temp.path().join("out/initramfs.cpio.gz");

        let summary = pack(&tree, &out, PackOptions::default()).unwrap();
        assert_eq!(summary.entries, tree.len());
        assert!(!sibling_with_suffix(&out, ".part").exists());

        let entries = unpack(&out).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["bin", "bin/busybox", "bin/sh", "dev", "dev/console", "init", "proc"]
        );
        for e in &entries {
            assert!(!e.name.starts_with('/'));
            assert_eq!((e.uid, e.gid, e.mtime), (0, 0, 0));
        }

        let init = entries.iter().find(|e| e.name == "init").unwrap();
        assert!(init.is_file());
        assert_eq!(init.permissions(), 0o755);
        assert_eq!(init.data, b"\x7fELF init");

        let console = entries.iter().find(|e| e.name == "dev/console").unwrap();
        assert!(console.is_char_device());
        assert_eq!((console.rdev_major, console.rdev_minor), (5, 1));
    }

    #[test]
    fn test_pack_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let tree = sample_tree(temp.path());
        let a = temp.path().join("a.cpio.gz");
        let b = temp.path().join("b.cpio.gz");

        let sa = pack(&tree, &a, PackOptions::default()).unwrap();
        let sb = pack(&tree, &b, PackOptions::default()).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
        assert_eq!(sa.sha256, sb.sha256);
    }

    #[test]
    fn test_gzip_header_has_no_timestamp() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("i.cpio.gz");
        pack(&sample_tree(temp.path()), &out, PackOptions::default()).unwrap();
        let bytes = fs::read(&out).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_missing_source_is_pack_error() {
        let temp = TempDir::new().unwrap();
        let mut tree = FilesystemTree::new();
        let missing = temp.path().join("vanished");
        tree.add_file("init", FileSource::Path(missing.clone()), 0o755).unwrap();
        let out = temp.path().join("i.cpio.gz");

        match pack(&tree, &out, PackOptions::default()).unwrap_err() {
            Error::Pack { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!out.exists());
        assert!(!sibling_with_suffix(&out, ".part").exists());
    }

    #[test]
    fn test_invalid_gzip_level() {
        let temp = TempDir::new().unwrap();
        let err = pack(
            &FilesystemTree::new(),
            &temp.path().join("x.cpio.gz"),
            PackOptions { gzip_level: 12 },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
