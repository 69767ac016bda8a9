//! Boot image orchestration.
//!
//! [`BootImageBuilder`] drives one build through a fixed sequence of states:
//!
//! ```text
//! Init -> CompilingInit -> ResolvingArtifacts -> BuildingTree -> Packing -> Ready
//!   \__________\_______________\____________________\______________\--> Failed
//! ```
//!
//! No state is revisited. A failed build is retried with a fresh builder;
//! cached artifacts make the retry cheap.

pub mod compile;
pub mod config;
pub mod manifest;

pub use compile::compile_init;
pub use config::{
    multiarch_dir, ArtifactSpec, BootOptions, BuildConfig, InitSource, LibrarySpec, Profile,
    KERNEL_ARTIFACT,
};
pub use manifest::BootManifest;

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::archive::{self, PackOptions};
use crate::artifact::{Artifact, ArtifactCache, Fetcher};
use crate::common::temp::prepare_work_dir;
use crate::error::{Error, IoResultExt, Result};
use crate::initramfs::{build_tree, ResolvedArtifacts, ResolvedLibrary};
use crate::timing::Timer;

/// Pipeline stage, used to report where a build failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    CompilingInit,
    ResolvingArtifacts,
    BuildingTree,
    Packing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::CompilingInit => "compiling init",
            Stage::ResolvingArtifacts => "resolving artifacts",
            Stage::BuildingTree => "building tree",
            Stage::Packing => "packing",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Init,
    CompilingInit,
    ResolvingArtifacts,
    BuildingTree,
    Packing,
    Ready,
    Failed { stage: Stage, reason: String },
}

impl BuildState {
    /// The stage this state runs, `None` for terminal states.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BuildState::Init => Some(Stage::Init),
            BuildState::CompilingInit => Some(Stage::CompilingInit),
            BuildState::ResolvingArtifacts => Some(Stage::ResolvingArtifacts),
            BuildState::BuildingTree => Some(Stage::BuildingTree),
            BuildState::Packing => Some(Stage::Packing),
            BuildState::Ready | BuildState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Ready => f.write_str("ready"),
            BuildState::Failed { stage, reason } => write!(f, "failed while {}: {}", stage, reason),
            other => match other.stage() {
                Some(stage) => write!(f, "{}", stage),
                None => Ok(()),
            },
        }
    }
}

/// Shared flag that stops a build at its next state transition.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BootImageBuilder {
    config: BuildConfig,
    cache: ArtifactCache,
    cancel: CancelToken,
    stage_tree: bool,
    state: BuildState,
    history: Vec<BuildState>,
}

impl BootImageBuilder {
    pub fn new(config: BuildConfig) -> Self {
        let cache = ArtifactCache::new(&config.cache_dir);
        Self {
            config,
            cache,
            cancel: CancelToken::new(),
            stage_tree: false,
            state: BuildState::Init,
            history: vec![BuildState::Init],
        }
    }

    /// Fetch artifacts through `fetcher` instead of curl.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.cache = ArtifactCache::with_fetcher(&self.config.cache_dir, fetcher);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Also write the tree to [`BuildConfig::staging_dir`].
    pub fn with_staging(mut self, stage_tree: bool) -> Self {
        self.stage_tree = stage_tree;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Every state entered so far, starting with `Init`.
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    fn transition(&mut self, next: BuildState) {
        tracing::debug!(from = %self.state, to = %next, "build state");
        self.history.push(next.clone());
        self.state = next;
    }

    fn advance(&mut self, next: BuildState) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(next.to_string()));
        }
        self.transition(next);
        Ok(())
    }

    /// Kernel, utility and libraries, in that order.
    pub fn artifacts(&self) -> Vec<Artifact> {
        let config = &self.config;
        let kernel = self
            .cache
            .artifact(KERNEL_ARTIFACT, config.kernel.locator.clone())
            .sha256(config.kernel.sha256.clone())
            .unpack(config.kernel.unpack.clone());
        let utility = self
            .cache
            .artifact(&config.utility_name, config.utility.locator.clone())
            .sha256(config.utility.sha256.clone())
            .unpack(config.utility.unpack.clone())
            .executable(true);

        let mut artifacts = vec![kernel, utility];
        artifacts.extend(
            config
                .libraries
                .iter()
                .map(|lib| self.cache.artifact(&lib.soname, lib.locator.clone())),
        );
        artifacts
    }

    /// Resolve every artifact through the cache, fetching concurrently.
    pub fn resolve_artifacts(&self) -> Result<ResolvedArtifacts> {
        let paths = self.cache.resolve_all(&self.artifacts())?;
        let mut paths = paths.into_iter();
        let (Some(kernel), Some(utility)) = (paths.next(), paths.next()) else {
            return Err(Error::Config("artifact resolution returned too few paths".into()));
        };
        let libraries = self
            .config
            .libraries
            .iter()
            .zip(paths)
            .map(|(lib, path)| ResolvedLibrary {
                soname: lib.soname.clone(),
                path,
            })
            .collect();
        Ok(ResolvedArtifacts {
            kernel,
            utility,
            libraries,
        })
    }

    /// Run the whole pipeline.
    ///
    /// On failure the builder ends in [`BuildState::Failed`] naming the stage
    /// that failed, and no manifest is written.
    pub fn build(&mut self) -> Result<BootManifest> {
        if self.state != BuildState::Init {
            return Err(Error::Config(
                "builder has already run, create a new one to rebuild".into(),
            ));
        }

        let total = Timer::start("boot image");
        match self.run_pipeline() {
            Ok(manifest) => {
                self.transition(BuildState::Ready);
                total.finish();
                Ok(manifest)
            }
            Err(e) => {
                let stage = self.state.stage().unwrap_or(Stage::Init);
                tracing::error!(%stage, error = %e, "build failed");
                self.transition(BuildState::Failed {
                    stage,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run_pipeline(&mut self) -> Result<BootManifest> {
        // A failed build of any kind must not leave the previous manifest behind.
        let manifest_path = self.config.manifest_path();
        if manifest_path.exists() {
            fs::remove_file(&manifest_path).with_path(&manifest_path)?;
        }
        self.config.validate()?;

        let build_dir = self.config.build_dir.clone();
        fs::create_dir_all(&build_dir).with_path(&build_dir)?;

        self.advance(BuildState::CompilingInit)?;
        let t = Timer::start("init");
        let init = compile_init(&self.config.init, &self.config.target, self.config.profile)?;
        t.finish();

        self.advance(BuildState::ResolvingArtifacts)?;
        let t = Timer::start("artifacts");
        let resolved = self.resolve_artifacts()?;
        t.finish();

        self.advance(BuildState::BuildingTree)?;
        let t = Timer::start("tree");
        let tree = build_tree(&self.config, &init, &resolved, self.config.overlay.as_deref())?;
        if self.stage_tree {
            let staging = self.staging_dir()?;
            tree.materialize(&staging)?;
            tracing::info!(path = %staging.display(), "tree staged for inspection");
        }
        t.finish();

        self.advance(BuildState::Packing)?;
        let t = Timer::start("archive");
        let summary = archive::pack(
            &tree,
            &self.config.archive_path(),
            PackOptions {
                gzip_level: self.config.gzip_level,
            },
        )?;
        t.finish();

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(BuildState::Ready.to_string()));
        }

        let manifest = BootManifest {
            kernel_image: resolved.kernel,
            initramfs_archive: summary.path,
            boot_command_line: self.config.boot.command_line(),
            archive_sha256: summary.sha256,
        };
        manifest.write(&manifest_path)?;
        tracing::info!(manifest = %manifest_path.display(), "boot image ready");
        Ok(manifest)
    }

    fn staging_dir(&self) -> Result<PathBuf> {
        let staging = self.config.staging_dir();
        let parent = staging.parent().unwrap_or(&self.config.build_dir);
        let name = staging
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "initramfs-root".to_string());
        prepare_work_dir(parent, &name)
    }
}

/// Build with a fresh builder; shorthand for the common case.
pub fn build_image(config: BuildConfig) -> Result<BootManifest> {
    BootImageBuilder::new(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Locator;
    use std::path::Path;
    use tempfile::TempDir;

    fn local_config(temp: &TempDir) -> BuildConfig {
        let root = temp.path();
        for (name, data) in [("init", "init"), ("Image", "kernel"), ("busybox", "bb")] {
            fs::write(root.join(name), data).unwrap();
        }
        let mut config = BuildConfig::new(root.join("build"), InitSource::Prebuilt(root.join("init")));
        config.kernel = ArtifactSpec::new(Locator::Path(root.join("Image")));
        config.utility = ArtifactSpec::new(Locator::Path(root.join("busybox")));
        config
    }

    #[test]
    fn test_history_of_successful_build() {
        let temp = TempDir::new().unwrap();
        let mut builder = BootImageBuilder::new(local_config(&temp));
        let manifest = builder.build().unwrap();

        assert_eq!(
            builder.history(),
            &[
                BuildState::Init,
                BuildState::CompilingInit,
                BuildState::ResolvingArtifacts,
                BuildState::BuildingTree,
                BuildState::Packing,
                BuildState::Ready,
            ]
        );
        assert!(manifest.boot_command_line.contains("rdinit=/init"));
        assert!(Path::new(&manifest.initramfs_archive).is_file());
    }

    #[test]
    fn test_builder_runs_once() {
        let temp = TempDir::new().unwrap();
        let mut builder = BootImageBuilder::new(local_config(&temp));
        builder.build().unwrap();
        assert!(matches!(builder.build(), Err(Error::Config(_))));
        assert_eq!(builder.state(), &BuildState::Ready);
    }

    #[test]
    fn test_config_error_fails_in_init() {
        let temp = TempDir::new().unwrap();
        let mut config = local_config(&temp);
        config.utility_name = String::new();
        let mut builder = BootImageBuilder::new(config);

        assert!(matches!(builder.build(), Err(Error::Config(_))));
        assert!(matches!(
            builder.state(),
            BuildState::Failed { stage: Stage::Init, .. }
        ));
        assert!(!temp.path().join("build").exists());
    }

    #[test]
    fn test_config_error_removes_previous_manifest() {
        let temp = TempDir::new().unwrap();
        let mut config = local_config(&temp);
        BootImageBuilder::new(config.clone()).build().unwrap();
        assert!(config.manifest_path().is_file());

        config.libraries.push(LibrarySpec::new(
            "libc.so.6",
            Locator::Path(temp.path().join("sysroot/libc.so.6")),
        ));
        let mut builder = BootImageBuilder::new(config);
        assert!(matches!(builder.build(), Err(Error::Config(_))));
        assert!(matches!(builder.state(), BuildState::Failed { stage: Stage::Init, .. }));
        assert!(!builder.config().manifest_path().exists());
    }

    #[test]
    fn test_cancel_before_start() {
        let temp = TempDir::new().unwrap();
        let token = CancelToken::new();
        let mut builder = BootImageBuilder::new(local_config(&temp)).with_cancel_token(token.clone());
        token.cancel();

        assert!(matches!(builder.build(), Err(Error::Cancelled(_))));
        assert!(matches!(builder.state(), BuildState::Failed { stage: Stage::Init, .. }));
        assert!(!builder.config().manifest_path().exists());
    }

    #[test]
    fn test_state_display() {
        let failed = BuildState::Failed {
            stage: Stage::Packing,
            reason: "disk full".into(),
        };
        assert_eq!(failed.to_string(), "failed while packing: disk full");
        assert_eq!(BuildState::ResolvingArtifacts.to_string(), "resolving artifacts");
        assert!(failed.is_terminal());
        assert!(!BuildState::Init.is_terminal());
    }
}
