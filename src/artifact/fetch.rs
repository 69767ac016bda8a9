//! Fetching artifact bytes from a locator into a local file.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::process::Cmd;

use super::Locator;

/// Moves the bytes behind a locator into `dest`.
///
/// `dest` is always a temporary path owned by the cache; implementations do
/// not need to be atomic themselves.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, name: &str, locator: &Locator, dest: &Path) -> Result<()>;
}

/// Copies local paths and `file://` URLs, downloads everything else with curl.
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher;

impl DefaultFetcher {
    fn copy_local(name: &str, locator: &Locator, src: &Path, dest: &Path) -> Result<()> {
        if !src.is_file() {
            return Err(Error::Fetch {
                name: name.to_string(),
                locator: locator.to_string(),
                reason: "source file does not exist".to_string(),
            });
        }
        fs::copy(src, dest).map_err(|e| Error::Fetch {
            name: name.to_string(),
            locator: locator.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn download(name: &str, url: &str, dest: &Path) -> Result<()> {
        // -f turns HTTP error statuses into a non-zero exit
        Cmd::new("curl")
            .args(["-fsSL", "--retry", "3", "-o"])
            .arg_path(dest)
            .arg(url)
            .error_msg(format!("Failed to download {}", name))
            .run()
            .map_err(|e| Error::Fetch {
                name: name.to_string(),
                locator: url.to_string(),
                reason: format!("{:#}", e),
            })?;
        Ok(())
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, name: &str, locator: &Locator, dest: &Path) -> Result<()> {
        match locator {
            Locator::Path(src) => Self::copy_local(name, locator, src, dest),
            Locator::Url(url) => match url.strip_prefix("file://") {
                Some(src) => Self::copy_local(name, locator, Path::new(src), dest),
                None => Self::download(name, url, dest),
            },
        }
    }
}
