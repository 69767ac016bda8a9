//! External artifacts: kernel image, multi-call utility binary, shared libraries.
//!
//! An [`Artifact`] names one immutable blob and where it lives once fetched.
//! The [`ArtifactCache`] turns artifacts into local paths, fetching only when
//! the destination is missing.

mod fetch;
mod resolve;
mod unpack;

pub use fetch::{DefaultFetcher, Fetcher};
pub use resolve::ArtifactCache;
pub use unpack::Unpack;

use std::fmt;
use std::path::{Path, PathBuf};

/// Where an artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `http://`, `https://` or `file://` address.
    Url(String),
    /// Plain filesystem path.
    Path(PathBuf),
}

impl Locator {
    /// Parse a locator string; anything without a known URL scheme is a path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://") {
            Locator::Url(s.to_string())
        } else {
            Locator::Path(PathBuf::from(s))
        }
    }

    /// Last path segment of the locator, used to name the cached file.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Locator::Url(url) => {
                let no_query = url.split(['?', '#']).next().unwrap_or(url);
                let rest = no_query
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(no_query);
                let (_, path) = rest.split_once('/')?;
                path.rsplit('/')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            }
            Locator::Path(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
        }
    }

    /// The local file this locator refers to, for path and `file://` sources.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            Locator::Path(path) => Some(path.clone()),
            Locator::Url(url) => url.strip_prefix("file://").map(PathBuf::from),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Url(url) => f.write_str(url),
            Locator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One external blob the build depends on.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Logical name ("kernel", "busybox", a library soname).
    pub name: String,
    pub locator: Locator,
    /// Where the resolved file lives; presence here means cache hit.
    pub dest: PathBuf,
    pub executable: bool,
    /// Expected SHA-256 of the fetched bytes, before unpacking.
    pub sha256: Option<String>,
    pub unpack: Unpack,
}

impl Artifact {
    pub fn new(name: impl Into<String>, locator: Locator, dest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            locator,
            dest: dest.into(),
            executable: false,
            sha256: None,
            unpack: Unpack::None,
        }
    }

    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub fn sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }

    pub fn unpack(mut self, unpack: Unpack) -> Self {
        self.unpack = unpack;
        self
    }

    pub fn is_cached(&self) -> bool {
        self.dest.is_file()
    }

    /// Temporary sibling the fetch writes into before the final rename.
    pub(crate) fn part_path(&self) -> PathBuf {
        sibling_with_suffix(&self.dest, ".part")
    }
}

pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_and_path() {
        assert_eq!(
            Locator::parse("https://busybox.net/downloads/busybox"),
            Locator::Url("https://busybox.net/downloads/busybox".into())
        );
        assert_eq!(
            Locator::parse("/opt/sysroot/lib/libc.so.6"),
            Locator::Path(PathBuf::from("/opt/sysroot/lib/libc.so.6"))
        );
    }

    #[test]
    fn test_file_name_strips_query() {
        let loc = Locator::parse("https://example.org/images/Image.gz?raw=1");
        assert_eq!(loc.file_name().as_deref(), Some("Image.gz"));
    }

    #[test]
    fn test_file_name_of_bare_host_is_none() {
        assert_eq!(Locator::parse("https://example.org/").file_name(), None);
        assert_eq!(Locator::parse("https://example.org").file_name(), None);
    }

    #[test]
    fn test_local_path_for_file_url() {
        let loc = Locator::parse("file:///tmp/busybox");
        assert_eq!(loc.local_path(), Some(PathBuf::from("/tmp/busybox")));
        assert_eq!(Locator::parse("https://x.org/a").local_path(), None);
    }

    #[test]
    fn test_part_path_is_sibling() {
        let a = Artifact::new("kernel", Locator::parse("/k/Image"), "/cache/kernel/Image");
        assert_eq!(a.part_path(), PathBuf::from("/cache/kernel/Image.part"));
    }
}
