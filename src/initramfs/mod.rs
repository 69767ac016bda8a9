//! Initramfs root filesystem construction.
//!
//! The tree is assembled in memory and only touches the host filesystem to
//! check that source files exist. Packing reads file content later, and
//! [`FilesystemTree::materialize`] can write the tree out for inspection.
//!
//! # Layout
//!
//! ```text
//! /init                  init binary (kernel entry point)
//! /bin/<utility>         static multi-call binary (busybox)
//! /bin/<cmd>          -> /bin/<utility>, one per essential command
//! /lib/<soname>          shared libraries
//! /lib/<multiarch>/...   linker search-path aliases
//! /dev/{console,null,zero,random,urandom,tty}
//! /proc /sys /tmp /run   empty mount points, mounted by init at boot
//! ```

pub mod devices;
mod filesystem;
mod materialize;
pub mod tree;

pub use devices::{device_nodes, DEVICE_NODES};
pub use materialize::MaterializeReport;
pub use filesystem::{build_tree, ResolvedArtifacts, ResolvedLibrary, SKELETON_DIRS};
pub use tree::{DeviceKind, DeviceNode, Entry, FileSource, FilesystemTree};

/// Commands symlinked to the multi-call utility binary.
pub const ESSENTIAL_COMMANDS: &[&str] = &[
    "sh", "ls", "cat", "echo", "mkdir", "mount", "umount", "ps", "kill", "sleep",
];

/// Default name of the multi-call utility under /bin.
pub const DEFAULT_UTILITY_NAME: &str = "busybox";

/// Path the kernel executes from the initramfs.
pub const INIT_PATH: &str = "/init";
