//! Inputs of a single boot image build.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::archive::DEFAULT_GZIP_LEVEL;
use crate::artifact::{Locator, Unpack};
use crate::error::{Error, Result};
use crate::initramfs::{DEFAULT_UTILITY_NAME, ESSENTIAL_COMMANDS, INIT_PATH};

pub const DEFAULT_TARGET: &str = "aarch64-unknown-linux-musl";
pub const DEFAULT_KERNEL_URL: &str = "https://deb.debian.org/debian/dists/bookworm/main/installer-arm64/current/images/netboot/debian-installer/arm64/linux";
pub const DEFAULT_BUSYBOX_URL: &str =
    "https://busybox.net/downloads/binaries/1.31.0-defconfig-multiarch-musl/busybox-armv8l";
pub const DEFAULT_CONSOLE: &str = "ttyAMA0";
/// Artifact (and cache directory) name of the kernel.
pub const KERNEL_ARTIFACT: &str = "kernel";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Debug,
    Release,
}

impl Profile {
    /// Directory cargo puts this profile's binaries in.
    pub fn dir_name(self) -> &'static str {
        match self {
            Profile::Debug => "debug",
            Profile::Release => "release",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "dev" => Ok(Profile::Debug),
            "release" => Ok(Profile::Release),
            other => Err(Error::Config(format!(
                "unknown profile '{}', expected debug or release",
                other
            ))),
        }
    }
}

/// Where the init binary comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitSource {
    /// Already built; used as is.
    Prebuilt(PathBuf),
    /// Built with `cargo build -p <package>` from the crate at `manifest_dir`.
    Cargo {
        manifest_dir: PathBuf,
        package: String,
        binary: String,
    },
}

impl InitSource {
    /// Cargo source whose binary is named after the package.
    pub fn cargo(manifest_dir: impl Into<PathBuf>, package: impl Into<String>) -> Self {
        let package = package.into();
        InitSource::Cargo {
            manifest_dir: manifest_dir.into(),
            binary: package.clone(),
            package,
        }
    }
}

/// Locator plus verification and unpack settings for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub locator: Locator,
    pub sha256: Option<String>,
    pub unpack: Unpack,
}

impl ArtifactSpec {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            sha256: None,
            unpack: Unpack::None,
        }
    }

    pub fn parse(locator: &str) -> Self {
        Self::new(Locator::parse(locator))
    }
}

/// A shared library the initramfs must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySpec {
    pub soname: String,
    pub locator: Locator,
}

impl LibrarySpec {
    pub fn new(soname: impl Into<String>, locator: Locator) -> Self {
        Self {
            soname: soname.into(),
            locator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOptions {
    pub console: String,
    pub extra_args: Vec<String>,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            console: DEFAULT_CONSOLE.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl BootOptions {
    /// `console=<console> rdinit=/init` followed by the extra arguments.
    pub fn command_line(&self) -> String {
        let mut parts = vec![
            format!("console={}", self.console),
            format!("rdinit={}", INIT_PATH),
        ];
        parts.extend(self.extra_args.iter().cloned());
        parts.join(" ")
    }
}

/// Debian-style multiarch library directory for a target triple.
///
/// `aarch64-unknown-linux-gnu` maps to `aarch64-linux-gnu`. musl and
/// non-Linux targets have no such directory.
pub fn multiarch_dir(target: &str) -> Option<String> {
    let parts: Vec<&str> = target.split('-').collect();
    let arch = parts.first()?;
    let env = parts.last()?;
    if parts.len() < 3 || !parts.contains(&"linux") || !env.starts_with("gnu") {
        return None;
    }
    Some(format!("{}-linux-{}", arch, env))
}

/// Everything one build needs. Not mutated once the build starts.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub profile: Profile,
    pub target: String,
    /// Scratch and output directory.
    pub build_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub init: InitSource,
    pub kernel: ArtifactSpec,
    pub utility: ArtifactSpec,
    pub utility_name: String,
    pub libraries: Vec<LibrarySpec>,
    pub essential_commands: Vec<String>,
    pub lib_subdir: Option<String>,
    pub overlay: Option<PathBuf>,
    pub boot: BootOptions,
    pub gzip_level: u32,
}

impl BuildConfig {
    /// Config with stock artifact sources and the cache under `build_dir`.
    pub fn new(build_dir: impl Into<PathBuf>, init: InitSource) -> Self {
        let build_dir = build_dir.into();
        Self {
            profile: Profile::Debug,
            target: DEFAULT_TARGET.to_string(),
            cache_dir: build_dir.join("downloads"),
            build_dir,
            init,
            kernel: ArtifactSpec::parse(DEFAULT_KERNEL_URL),
            utility: ArtifactSpec::parse(DEFAULT_BUSYBOX_URL),
            utility_name: DEFAULT_UTILITY_NAME.to_string(),
            libraries: Vec::new(),
            essential_commands: ESSENTIAL_COMMANDS.iter().map(|s| s.to_string()).collect(),
            lib_subdir: multiarch_dir(DEFAULT_TARGET),
            overlay: None,
            boot: BootOptions::default(),
            gzip_level: DEFAULT_GZIP_LEVEL,
        }
    }

    /// Change the target and re-derive the multiarch directory.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self.lib_subdir = multiarch_dir(&self.target);
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.build_dir.join("initramfs.cpio.gz")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.build_dir.join("manifest.json")
    }

    /// Where `--stage` materializes the tree.
    pub fn staging_dir(&self) -> PathBuf {
        self.build_dir.join("initramfs-root")
    }

    /// Check every input that can be checked without writing anything.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::Config("target triple is empty".into()));
        }
        check_name("utility name", &self.utility_name)?;
        if self.utility_name == KERNEL_ARTIFACT {
            return Err(Error::Config(format!(
                "utility name '{}' collides with the kernel artifact",
                self.utility_name
            )));
        }
        for cmd in &self.essential_commands {
            check_name("essential command", cmd)?;
        }
        // Artifact names double as cache directories.
        let mut sonames = HashSet::new();
        for lib in &self.libraries {
            check_name("library soname", &lib.soname)?;
            if lib.soname == KERNEL_ARTIFACT || lib.soname == self.utility_name {
                return Err(Error::Config(format!(
                    "library soname '{}' collides with the {} artifact",
                    lib.soname,
                    if lib.soname == KERNEL_ARTIFACT { "kernel" } else { "utility" }
                )));
            }
            if !sonames.insert(lib.soname.as_str()) {
                return Err(Error::Config(format!(
                    "library soname '{}' listed more than once",
                    lib.soname
                )));
            }
            check_local("shared library", &lib.soname, &lib.locator)?;
        }
        check_local("kernel", KERNEL_ARTIFACT, &self.kernel.locator)?;
        check_local("utility", &self.utility_name, &self.utility.locator)?;

        match &self.init {
            InitSource::Prebuilt(path) => {
                if !path.is_file() {
                    return Err(Error::Config(format!(
                        "init binary not found: {}",
                        path.display()
                    )));
                }
            }
            InitSource::Cargo {
                manifest_dir,
                package,
                binary,
            } => {
                if !manifest_dir.join("Cargo.toml").is_file() {
                    return Err(Error::Config(format!(
                        "no Cargo.toml in init source directory {}",
                        manifest_dir.display()
                    )));
                }
                check_name("init package", package)?;
                check_name("init binary", binary)?;
            }
        }

        if let Some(subdir) = &self.lib_subdir {
            if subdir.is_empty() || subdir.contains('/') {
                return Err(Error::Config(format!("invalid library subdirectory '{}'", subdir)));
            }
        }
        if self.gzip_level > 9 {
            return Err(Error::Config(format!(
                "gzip level {} out of range 0-9",
                self.gzip_level
            )));
        }
        if self.boot.console.trim().is_empty() {
            return Err(Error::Config("console device is empty".into()));
        }
        Ok(())
    }
}

/// A single path component: non-empty, no `/`, not `.` or `..`.
fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(Error::Config(format!("invalid {} '{}'", what, name)));
    }
    Ok(())
}

/// Local sources must exist before the build touches anything.
fn check_local(what: &str, name: &str, locator: &Locator) -> Result<()> {
    match locator.local_path() {
        Some(path) if !path.is_file() => Err(Error::Config(format!(
            "{} '{}' not found at {}",
            what,
            name,
            path.display()
        ))),
        _ => Ok(()),
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn absolutize(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
