//! bootforge library.
//!
//! Builds a bootable kernel + initramfs pair in four steps:
//!
//! 1. [`artifact::ArtifactCache`] fetches the kernel, the multi-call utility
//!    binary and shared libraries, reusing anything already cached.
//! 2. [`initramfs::build_tree`] lays out the root filesystem in memory.
//! 3. [`archive::pack`] writes it as a reproducible gzip'd newc cpio archive.
//! 4. [`build::BootImageBuilder`] drives the steps and records a
//!    [`build::BootManifest`] for the launch step.
//!
//! The binary in `main.rs` adds configuration loading and the CLI.

pub mod archive;
pub mod artifact;
pub mod build;
pub mod cache;
pub mod clean;
pub mod commands;
pub mod common;
pub mod config;
pub mod error;
pub mod initramfs;
pub mod preflight;
pub mod process;
pub mod qemu;
pub mod timing;

pub use error::{Error, Result};
