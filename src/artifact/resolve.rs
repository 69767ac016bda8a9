//! Cache-by-path artifact resolution.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache;
use crate::error::{Error, IoResultExt, Result};

use super::{sibling_with_suffix, Artifact, DefaultFetcher, Fetcher, Locator};

/// Resolves artifacts to local files under a cache directory.
///
/// A file already present at an artifact's destination is returned as is.
/// Anything else is fetched into `<dest>.part`, verified, unpacked and renamed
/// into place, so an interrupted fetch never leaves a file at `dest`.
#[derive(Clone)]
pub struct ArtifactCache {
    root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(root, Arc::new(DefaultFetcher))
    }

    pub fn with_fetcher(root: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            root: root.into(),
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build an artifact whose destination is `<root>/<name>/<file name>`.
    ///
    /// The file name comes from the locator, falling back to the artifact name.
    pub fn artifact(&self, name: &str, locator: Locator) -> Artifact {
        let file_name = locator.file_name().unwrap_or_else(|| name.to_string());
        let dest = self.root.join(name).join(file_name);
        Artifact::new(name, locator, dest)
    }

    /// Resolve one artifact to its local path, fetching only on a cache miss.
    pub fn resolve(&self, artifact: &Artifact) -> Result<PathBuf> {
        if artifact.is_cached() {
            tracing::debug!(
                artifact = %artifact.name,
                path = %artifact.dest.display(),
                "cache hit"
            );
            return Ok(artifact.dest.clone());
        }

        tracing::info!(artifact = %artifact.name, source = %artifact.locator, "fetching");

        if let Some(parent) = artifact.dest.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        let part = artifact.part_path();
        let unpacked = sibling_with_suffix(&artifact.dest, ".unpacked");
        remove_stale(&part)?;
        remove_stale(&unpacked)?;

        let result = self.fetch_into_place(artifact, &part, &unpacked);
        // leftovers only exist on failure or after an unpack step
        let _ = fs::remove_file(&part);
        let _ = fs::remove_file(&unpacked);
        result?;

        Ok(artifact.dest.clone())
    }

    fn fetch_into_place(&self, artifact: &Artifact, part: &Path, unpacked: &Path) -> Result<()> {
        self.fetcher
            .fetch(&artifact.name, &artifact.locator, part)?;

        if !part.is_file() {
            return Err(Error::Fetch {
                name: artifact.name.clone(),
                locator: artifact.locator.to_string(),
                reason: "fetch reported success but produced no file".to_string(),
            });
        }

        if let Some(expected) = &artifact.sha256 {
            let actual = cache::hash_file(part).map_err(|e| Error::integrity(&artifact.name, part, e))?;
            if !cache::digests_match(expected, &actual) {
                return Err(Error::integrity(
                    &artifact.name,
                    part,
                    format!("checksum mismatch: expected {}, got {}", expected, actual),
                ));
            }
        }

        let payload = artifact.unpack.apply(&artifact.name, part, unpacked)?;
        if !payload.is_file() {
            return Err(Error::integrity(
                &artifact.name,
                &payload,
                "unpack step produced no file",
            ));
        }

        if artifact.executable {
            fs::set_permissions(&payload, fs::Permissions::from_mode(0o755)).with_path(&payload)?;
        }

        fs::rename(&payload, &artifact.dest).with_path(&artifact.dest)?;
        tracing::info!(artifact = %artifact.name, path = %artifact.dest.display(), "cached");
        Ok(())
    }

    /// Resolve independent artifacts concurrently.
    ///
    /// Paths come back in input order. The first failure (in input order) is
    /// returned once every fetch has finished, so no fetch is left writing
    /// into the cache after this returns.
    ///
    /// Each call drives the fetches on a short-lived runtime of its own. When
    /// called from inside a tokio runtime, that runtime lives on a separate
    /// thread and the caller blocks until it finishes.
    pub fn resolve_all(&self, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
        if artifacts.len() <= 1 {
            return artifacts.iter().map(|a| self.resolve(a)).collect();
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return std::thread::scope(|scope| {
                scope
                    .spawn(|| self.resolve_concurrently(artifacts))
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            });
        }
        self.resolve_concurrently(artifacts)
    }

    fn resolve_concurrently(&self, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .with_path(&self.root)?;

        runtime.block_on(async {
            let handles: Vec<_> = artifacts
                .iter()
                .cloned()
                .map(|artifact| {
                    let cache = self.clone();
                    tokio::task::spawn_blocking(move || cache.resolve(&artifact))
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for (handle, artifact) in handles.into_iter().zip(artifacts) {
                let result = handle.await.unwrap_or_else(|e| {
                    Err(Error::Fetch {
                        name: artifact.name.clone(),
                        locator: artifact.locator.to_string(),
                        reason: format!("fetch task failed: {}", e),
                    })
                });
                results.push(result);
            }
            results.into_iter().collect()
        })
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "removing partial file from an earlier run");
        fs::remove_file(path).with_path(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes fixed bytes and counts calls.
    struct CountingFetcher {
        calls: AtomicUsize,
        payload: Vec<u8>,
        seen: Mutex<Vec<String>>,
    }

    impl CountingFetcher {
        fn new(payload: &[u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                payload: payload.to_vec(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, name: &str, _locator: &Locator, dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(name.to_string());
            fs::write(dest, &self.payload).with_path(dest)
        }
    }

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn fetch(&self, name: &str, locator: &Locator, dest: &Path) -> Result<()> {
            // leave a partial file behind, as an interrupted download would
            fs::write(dest, b"partial").with_path(dest)?;
            Err(Error::Fetch {
                name: name.to_string(),
                locator: locator.to_string(),
                reason: "HTTP 404".to_string(),
            })
        }
    }

    #[test]
    fn test_cache_hit_skips_fetch() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"fresh"));
        let cache = ArtifactCache::with_fetcher(temp.path(), fetcher.clone());

        let artifact = cache.artifact("kernel", Locator::parse("https://example.invalid/Image"));
        fs::create_dir_all(artifact.dest.parent().unwrap()).unwrap();
        fs::write(&artifact.dest, b"already here").unwrap();

        let path = cache.resolve(&artifact).unwrap();
        assert_eq!(path, artifact.dest);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(&path).unwrap(), b"already here");
    }

    #[test]
    fn test_miss_fetches_once_then_hits() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"busybox bytes"));
        let cache = ArtifactCache::with_fetcher(temp.path(), fetcher.clone());
        let artifact = cache
            .artifact("busybox", Locator::parse("https://example.invalid/busybox"))
            .executable(true);

        cache.resolve(&artifact).unwrap();
        cache.resolve(&artifact).unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let mode = fs::metadata(&artifact.dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(!artifact.part_path().exists());
    }

    #[test]
    fn test_failed_fetch_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::with_fetcher(temp.path(), Arc::new(FailingFetcher));
        let artifact = cache.artifact("kernel", Locator::parse("https://example.invalid/Image"));

        let err = cache.resolve(&artifact).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(!artifact.dest.exists());
        assert!(!artifact.part_path().exists());
    }

    #[test]
    fn test_stale_part_file_is_replaced() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"complete"));
        let cache = ArtifactCache::with_fetcher(temp.path(), fetcher);
        let artifact = cache.artifact("kernel", Locator::parse("https://example.invalid/Image"));

        fs::create_dir_all(artifact.dest.parent().unwrap()).unwrap();
        fs::write(artifact.part_path(), b"half a kern").unwrap();

        cache.resolve(&artifact).unwrap();
        assert_eq!(fs::read(&artifact.dest).unwrap(), b"complete");
    }

    #[test]
    fn test_checksum_mismatch_is_integrity_error() {
        let temp = TempDir::new().unwrap();
        let cache =
            ArtifactCache::with_fetcher(temp.path(), Arc::new(CountingFetcher::new(b"tampered")));
        let artifact = cache
            .artifact("kernel", Locator::parse("https://example.invalid/Image"))
            .sha256(Some(cache::hash_bytes(b"genuine")));

        let err = cache.resolve(&artifact).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!artifact.dest.exists());
    }

    #[test]
    fn test_checksum_match_is_accepted() {
        let temp = TempDir::new().unwrap();
        let cache =
            ArtifactCache::with_fetcher(temp.path(), Arc::new(CountingFetcher::new(b"genuine")));
        let artifact = cache
            .artifact("kernel", Locator::parse("https://example.invalid/Image"))
            .sha256(Some(cache::hash_bytes(b"genuine").to_uppercase()));

        assert!(cache.resolve(&artifact).is_ok());
    }

    #[test]
    fn test_resolve_all_preserves_order() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"x"));
        let cache = ArtifactCache::with_fetcher(temp.path(), fetcher.clone());

        let artifacts: Vec<_> = ["kernel", "busybox", "libc.so.6"]
            .iter()
            .map(|n| cache.artifact(n, Locator::parse(&format!("https://example.invalid/{}", n))))
            .collect();

        let paths = cache.resolve_all(&artifacts).unwrap();
        let expected: Vec<_> = artifacts.iter().map(|a| a.dest.clone()).collect();
        assert_eq!(paths, expected);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fetcher.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_all_inside_runtime() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(CountingFetcher::new(b"x"));
        let cache = ArtifactCache::with_fetcher(temp.path(), fetcher.clone());
        let artifacts = vec![
            cache.artifact("kernel", Locator::parse("https://example.invalid/Image")),
            cache.artifact("busybox", Locator::parse("https://example.invalid/busybox")),
        ];

        let paths = cache.resolve_all(&artifacts).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_file()));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_all_reports_failure() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::with_fetcher(temp.path(), Arc::new(FailingFetcher));
        let artifacts = vec![
            cache.artifact("kernel", Locator::parse("https://example.invalid/Image")),
            cache.artifact("busybox", Locator::parse("https://example.invalid/busybox")),
        ];

        let err = cache.resolve_all(&artifacts).unwrap_err();
        match err {
            Error::Fetch { name, .. } => assert_eq!(name, "kernel"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
