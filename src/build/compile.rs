//! Produce the init binary, building it with cargo when needed.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::Cmd;

use super::config::{InitSource, Profile};

/// Path of the binary `cargo build` leaves for this target and profile.
pub fn cargo_output_path(manifest_dir: &Path, target: &str, profile: Profile, binary: &str) -> PathBuf {
    manifest_dir
        .join("target")
        .join(target)
        .join(profile.dir_name())
        .join(binary)
}

/// Return the init binary for `source`, compiling a cargo source first.
pub fn compile_init(source: &InitSource, target: &str, profile: Profile) -> Result<PathBuf> {
    match source {
        InitSource::Prebuilt(path) => {
            if !path.is_file() {
                return Err(Error::Compile(format!(
                    "prebuilt init binary missing: {}",
                    path.display()
                )));
            }
            tracing::info!(path = %path.display(), "using prebuilt init");
            Ok(path.clone())
        }
        InitSource::Cargo {
            manifest_dir,
            package,
            binary,
        } => {
            tracing::info!(package = %package, %target, %profile, "compiling init");

            let mut cmd = Cmd::new("cargo")
                .arg("build")
                .arg("--manifest-path")
                .arg_path(&manifest_dir.join("Cargo.toml"))
                .args(["--target", target, "-p", package.as_str()])
                .env("CARGO_TARGET_DIR", manifest_dir.join("target").to_string_lossy())
                .error_msg(&format!("cargo build of '{}' failed", package));
            if profile == Profile::Release {
                cmd = cmd.arg("--release");
            }
            cmd.run().map_err(|e| Error::Compile(format!("{:#}", e)))?;

            let output = cargo_output_path(manifest_dir, target, profile, binary);
            if !output.is_file() {
                return Err(Error::Compile(format!(
                    "cargo succeeded but {} does not exist",
                    output.display()
                )));
            }
            Ok(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cargo_output_path() {
        let path = cargo_output_path(
            Path::new("/src/initd"),
            "aarch64-unknown-linux-musl",
            Profile::Release,
            "initd",
        );
        assert_eq!(
            path,
            PathBuf::from("/src/initd/target/aarch64-unknown-linux-musl/release/initd")
        );
    }

    #[test]
    fn test_prebuilt_is_passed_through() {
        let temp = TempDir::new().unwrap();
        let init = temp.path().join("init");
        std::fs::write(&init, b"x").unwrap();
        let path = compile_init(&InitSource::Prebuilt(init.clone()), "t", Profile::Debug).unwrap();
        assert_eq!(path, init);
    }

    #[test]
    fn test_missing_prebuilt_is_compile_error() {
        let temp = TempDir::new().unwrap();
        let err = compile_init(
            &InitSource::Prebuilt(temp.path().join("init")),
            "t",
            Profile::Debug,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
    }
}
