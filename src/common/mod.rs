//! Shared utilities.

pub mod temp;

pub use temp::{cleanup_work_dir, prepare_work_dir};
