//! Shared test utilities for bootforge tests.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bootforge::artifact::{Fetcher, Locator};
use bootforge::build::{ArtifactSpec, BuildConfig, InitSource};
use bootforge::Error;
use tempfile::TempDir;

/// Test environment with stub inputs and a scratch build directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Base directory (project root simulation)
    pub base_dir: PathBuf,
    /// Stub init, kernel, busybox and libraries live here
    pub inputs: PathBuf,
    pub build_dir: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with stub init, kernel and busybox.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();
        let inputs = base_dir.join("inputs");
        let build_dir = base_dir.join("build");

        create_mock_binary(&inputs.join("init"), b"\x7fELF fake init\n");
        create_mock_binary(&inputs.join("busybox"), b"\x7fELF fake busybox\n");
        fs::write(inputs.join("Image"), b"ARM64 kernel image stub").expect("Failed to write kernel");

        Self {
            _temp_dir: temp_dir,
            base_dir,
            inputs,
            build_dir,
        }
    }

    pub fn input(&self, name: &str) -> PathBuf {
        self.inputs.join(name)
    }

    /// Debug profile, no overlay, prebuilt init, local artifacts.
    pub fn config(&self) -> BuildConfig {
        let mut config = BuildConfig::new(&self.build_dir, InitSource::Prebuilt(self.input("init")));
        config.kernel = ArtifactSpec::new(Locator::Path(self.input("Image")));
        config.utility = ArtifactSpec::new(Locator::Path(self.input("busybox")));
        config
    }

    /// Same as [`config`](Self::config) but kernel and busybox come from URLs,
    /// so only an injected fetcher can resolve them.
    pub fn remote_config(&self) -> BuildConfig {
        let mut config = self.config();
        config.kernel = ArtifactSpec::parse("https://artifacts.example.invalid/arm64/Image");
        config.utility = ArtifactSpec::parse("https://artifacts.example.invalid/busybox-armv8l");
        config
    }

    pub fn overlay(&self) -> PathBuf {
        self.base_dir.join("overlay")
    }
}

/// Create a mock executable binary file.
pub fn create_mock_binary(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, content).expect("Failed to create mock binary");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("Failed to set permissions");
}

/// Create a mock shared library file.
pub fn create_mock_library(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for library");
    }
    fs::write(path, b"\x7fELF fake shared object").expect("Failed to create mock library");
}

/// Writes fixed bytes for every fetch and records what was asked for.
pub struct CountingFetcher {
    calls: AtomicUsize,
    names: Mutex<Vec<String>>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.names.lock().unwrap().clone();
        names.sort();
        names
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, name: &str, locator: &Locator, dest: &Path) -> bootforge::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(name.to_string());
        fs::write(dest, format!("fetched {} from {}", name, locator)).map_err(|source| Error::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}

/// Behaves like an unreachable host.
pub struct UnreachableFetcher;

impl Fetcher for UnreachableFetcher {
    fn fetch(&self, name: &str, locator: &Locator, _dest: &Path) -> bootforge::Result<()> {
        Err(Error::Fetch {
            name: name.to_string(),
            locator: locator.to_string(),
            reason: "Could not resolve host".to_string(),
        })
    }
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that nothing exists at a path.
pub fn assert_absent(path: &Path) {
    assert!(
        path.symlink_metadata().is_err(),
        "Expected nothing at {}",
        path.display()
    );
}
