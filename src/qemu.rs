//! Launch a built boot image under QEMU.

use anyhow::{bail, Result};

use crate::build::BootManifest;
use crate::process::Cmd;

pub const DEFAULT_QEMU_BINARY: &str = "qemu-system-aarch64";
pub const DEFAULT_MACHINE: &str = "virt";
pub const DEFAULT_CPU: &str = "cortex-a57";
pub const DEFAULT_MEMORY: &str = "1G";

/// Emulator settings, passed through to QEMU as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuConfig {
    pub binary: String,
    pub machine: String,
    pub cpu: String,
    pub memory: String,
    pub extra_args: Vec<String>,
}

impl Default for QemuConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_QEMU_BINARY.to_string(),
            machine: DEFAULT_MACHINE.to_string(),
            cpu: DEFAULT_CPU.to_string(),
            memory: DEFAULT_MEMORY.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl QemuConfig {
    /// Arguments for a direct kernel boot of `manifest` on the serial console.
    pub fn args(&self, manifest: &BootManifest) -> Vec<String> {
        let mut args = vec![
            "-machine".to_string(),
            self.machine.clone(),
            "-cpu".to_string(),
            self.cpu.clone(),
            "-m".to_string(),
            self.memory.clone(),
            "-kernel".to_string(),
            manifest.kernel_image.to_string_lossy().into_owned(),
            "-initrd".to_string(),
            manifest.initramfs_archive.to_string_lossy().into_owned(),
            "-append".to_string(),
            manifest.boot_command_line.clone(),
            "-nographic".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Boot `manifest` with the terminal attached to the guest console.
    pub fn launch(&self, manifest: &BootManifest) -> Result<()> {
        if !manifest.is_complete() {
            bail!(
                "Boot image incomplete: {} or {} is missing. Run 'bootforge build' first.",
                manifest.kernel_image.display(),
                manifest.initramfs_archive.display()
            );
        }

        println!("Booting with {}", self.binary);
        println!("  Kernel:    {}", manifest.kernel_image.display());
        println!("  Initramfs: {}", manifest.initramfs_archive.display());
        println!("  Cmdline:   {}", manifest.boot_command_line);
        println!("Press Ctrl+A, X to exit QEMU\n");

        Cmd::new(&self.binary)
            .args(self.args(manifest))
            .error_msg(format!("{} exited with an error", self.binary))
            .run_interactive()?;
        Ok(())
    }
}
