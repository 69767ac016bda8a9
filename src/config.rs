//! Configuration management for bootforge.
//!
//! Reads configuration from a `.env` file in the project directory and the
//! process environment. Environment variables take precedence over `.env`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::artifact::{Locator, Unpack};
use crate::build::config::absolutize;
use crate::build::{ArtifactSpec, BuildConfig, InitSource, LibrarySpec, Profile};
use crate::error::{Error, Result};
use crate::qemu::QemuConfig;

/// Everything the CLI needs: the build inputs plus emulator settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub build: BuildConfig,
    pub qemu: QemuConfig,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `soname=locator` pairs, comma separated.
fn parse_libraries(base_dir: &Path, value: &str) -> Result<Vec<LibrarySpec>> {
    split_list(value)
        .into_iter()
        .map(|item| {
            let (soname, locator) = item.split_once('=').ok_or_else(|| {
                Error::Config(format!("SHARED_LIBS entry '{}' is not soname=locator", item))
            })?;
            Ok(LibrarySpec::new(soname.trim(), locator_from(base_dir, locator.trim())))
        })
        .collect()
}

/// Relative paths are taken relative to the project directory.
fn locator_from(base_dir: &Path, value: &str) -> Locator {
    match Locator::parse(value) {
        Locator::Path(path) => Locator::Path(absolutize(base_dir, path)),
        url => url,
    }
}

impl Config {
    /// Load from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            let iter = dotenvy::from_path_iter(&env_path)
                .map_err(|e| Error::Config(format!("{}: {}", env_path.display(), e)))?;
            for item in iter {
                let (key, value) =
                    item.map_err(|e| Error::Config(format!("{}: {}", env_path.display(), e)))?;
                vars.insert(key, value);
            }
        }

        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }

        Self::from_vars(base_dir, &vars)
    }

    /// Build a config from an explicit variable map.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let path = |key: &str| get(key).map(|v| absolutize(base_dir, v));

        let build_dir = path("BUILD_DIR").unwrap_or_else(|| base_dir.join("build"));

        let init = match path("INIT_BINARY") {
            Some(binary) => InitSource::Prebuilt(binary),
            None => {
                let manifest_dir = path("INIT_MANIFEST_DIR").unwrap_or_else(|| base_dir.join("initd"));
                let package = get("INIT_PACKAGE").unwrap_or("initd").to_string();
                let binary = get("INIT_BIN").map(str::to_string).unwrap_or_else(|| package.clone());
                InitSource::Cargo {
                    manifest_dir,
                    package,
                    binary,
                }
            }
        };

        let mut build = BuildConfig::new(build_dir, init);
        if let Some(target) = get("TARGET") {
            build = build.with_target(target);
        }
        if let Some(cache_dir) = path("CACHE_DIR") {
            build.cache_dir = cache_dir;
        }
        if let Some(profile) = get("PROFILE") {
            build.profile = profile.parse::<Profile>()?;
        }

        build.kernel = artifact_spec(base_dir, &get, "KERNEL", build.kernel)?;
        build.utility = artifact_spec(base_dir, &get, "BUSYBOX", build.utility)?;
        if let Some(name) = get("UTILITY_NAME") {
            build.utility_name = name.to_string();
        }
        if let Some(libs) = get("SHARED_LIBS") {
            build.libraries = parse_libraries(base_dir, libs)?;
        }
        if let Some(commands) = get("ESSENTIAL_COMMANDS") {
            build.essential_commands = split_list(commands);
        }
        build.overlay = path("OVERLAY_DIR");
        if let Some(console) = get("CONSOLE") {
            build.boot.console = console.to_string();
        }
        if let Some(extra) = get("CMDLINE_EXTRA") {
            build.boot.extra_args = extra.split_whitespace().map(str::to_string).collect();
        }
        if let Some(level) = get("GZIP_LEVEL") {
            build.gzip_level = level
                .parse()
                .map_err(|_| Error::Config(format!("GZIP_LEVEL '{}' is not a number", level)))?;
        }

        let mut qemu = QemuConfig::default();
        if let Some(v) = get("QEMU_BINARY") {
            qemu.binary = v.to_string();
        }
        if let Some(v) = get("QEMU_MACHINE") {
            qemu.machine = v.to_string();
        }
        if let Some(v) = get("QEMU_CPU") {
            qemu.cpu = v.to_string();
        }
        if let Some(v) = get("QEMU_MEMORY") {
            qemu.memory = v.to_string();
        }
        if let Some(v) = get("QEMU_EXTRA") {
            qemu.extra_args = v.split_whitespace().map(str::to_string).collect();
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            build,
            qemu,
        })
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        let b = &self.build;
        println!("Configuration:");
        println!("  BUILD_DIR: {}", b.build_dir.display());
        println!("  CACHE_DIR: {}", b.cache_dir.display());
        println!("  PROFILE: {}", b.profile);
        println!("  TARGET: {}", b.target);
        match &b.init {
            InitSource::Prebuilt(path) => println!("  INIT_BINARY: {}", path.display()),
            InitSource::Cargo {
                manifest_dir,
                package,
                binary,
            } => {
                println!("  INIT_MANIFEST_DIR: {}", manifest_dir.display());
                println!("  INIT_PACKAGE: {} (binary '{}')", package, binary);
            }
        }
        println!("  KERNEL_URL: {}", b.kernel.locator);
        println!("  BUSYBOX_URL: {}", b.utility.locator);
        println!("  UTILITY_NAME: {}", b.utility_name);
        if b.libraries.is_empty() {
            println!("  SHARED_LIBS: (none)");
        } else {
            for lib in &b.libraries {
                println!("  SHARED_LIBS: {} = {}", lib.soname, lib.locator);
            }
        }
        println!(
            "  Library subdir: {}",
            b.lib_subdir.as_deref().unwrap_or("(none)")
        );
        println!("  ESSENTIAL_COMMANDS: {}", b.essential_commands.join(","));
        match &b.overlay {
            Some(dir) if dir.is_dir() => println!("  OVERLAY_DIR: {}", dir.display()),
            Some(dir) => println!("  OVERLAY_DIR: {} (NOT FOUND, ignored)", dir.display()),
            None => println!("  OVERLAY_DIR: (none)"),
        }
        println!("  Boot command line: {}", b.boot.command_line());
        println!("  GZIP_LEVEL: {}", b.gzip_level);
        println!(
            "  QEMU: {} -machine {} -cpu {} -m {}",
            self.qemu.binary, self.qemu.machine, self.qemu.cpu, self.qemu.memory
        );
    }
}

/// Read `<PREFIX>_URL`, `<PREFIX>_SHA256` and `<PREFIX>_UNPACK` over `default`.
fn artifact_spec<'a>(
    base_dir: &Path,
    get: &impl Fn(&str) -> Option<&'a str>,
    prefix: &str,
    default: ArtifactSpec,
) -> Result<ArtifactSpec> {
    let mut spec = default;
    if let Some(url) = get(&format!("{}_URL", prefix)) {
        spec.locator = locator_from(base_dir, url);
    }
    spec.sha256 = get(&format!("{}_SHA256", prefix)).map(str::to_string);
    if let Some(unpack) = get(&format!("{}_UNPACK", prefix)) {
        spec.unpack = unpack.parse::<Unpack>()?;
    }
    Ok(spec)
}
