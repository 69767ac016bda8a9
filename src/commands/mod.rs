//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build the boot image
//! - `run` - Boot it in QEMU
//! - `download` - Fetch artifacts into the cache
//! - `show` - Display configuration, manifest or archive contents
//! - `clean` - Remove build outputs
//! - `preflight` - Run preflight checks

pub mod build;
pub mod clean;
mod download;
mod preflight;
pub mod run;
pub mod show;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use download::cmd_download;
pub use preflight::cmd_preflight;
pub use run::cmd_run;
pub use show::cmd_show;
