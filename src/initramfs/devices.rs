//! Static device nodes the kernel and init need before devtmpfs is mounted.

use super::tree::{DeviceKind, DeviceNode};

/// (path, kind, major, minor, mode)
pub const DEVICE_NODES: &[(&str, DeviceKind, u32, u32, u32)] = &[
    ("dev/console", DeviceKind::Char, 5, 1, 0o622),
    ("dev/null", DeviceKind::Char, 1, 3, 0o666),
    ("dev/zero", DeviceKind::Char, 1, 5, 0o666),
    ("dev/random", DeviceKind::Char, 1, 8, 0o444),
    ("dev/urandom", DeviceKind::Char, 1, 9, 0o444),
    ("dev/tty", DeviceKind::Char, 5, 0, 0o666),
];

/// Device node table as typed entries.
pub fn device_nodes() -> impl Iterator<Item = (&'static str, DeviceNode)> {
    DEVICE_NODES.iter().map(|&(path, kind, major, minor, mode)| {
        (
            path,
            DeviceNode {
                kind,
                major,
                minor,
                mode,
            },
        )
    })
}
