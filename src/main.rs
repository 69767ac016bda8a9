//! bootforge - kernel + initramfs boot image builder.
//!
//! Produces, for an aarch64 target:
//! - a cached kernel image
//! - a gzip'd newc initramfs holding the init binary, busybox, shared
//!   libraries, device nodes and an optional overlay
//! - the kernel command line, recorded with both paths in manifest.json

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bootforge::build::Profile;
use bootforge::commands::{self, build::BuildOptions, clean::CleanTarget, show::ShowTarget};
use bootforge::config::Config;

#[derive(Parser)]
#[command(name = "bootforge")]
#[command(about = "Kernel + initramfs boot image builder")]
#[command(
    after_help = "QUICK START:\n  bootforge preflight  Check tools and inputs\n  bootforge build      Build the boot image\n  bootforge run        Boot it in QEMU\n  bootforge clean      Remove build outputs"
)]
struct Cli {
    /// Project directory holding .env and the default build directory
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the boot image (downloads artifacts automatically)
    Build {
        /// Compile init with the release profile
        #[arg(long)]
        release: bool,
        /// Also write the initramfs tree to <build>/initramfs-root
        #[arg(long)]
        stage: bool,
    },

    /// Boot the image in QEMU (builds it first if needed)
    Run {
        /// Compile init with the release profile
        #[arg(long)]
        release: bool,
    },

    /// Fetch kernel, busybox and libraries into the cache
    Download,

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowWhat,
    },

    /// Clean build outputs (default: preserves downloads)
    Clean {
        #[command(subcommand)]
        what: Option<CleanWhat>,
    },

    /// Run preflight checks (verify tools and inputs before build)
    Preflight {
        /// Exit with an error if any check fails
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ShowWhat {
    /// Show current configuration
    Config,
    /// Show the last build manifest
    Manifest,
    /// List the initramfs archive contents
    Archive,
}

#[derive(Subcommand)]
enum CleanWhat {
    /// Archive, manifest and staged tree
    Outputs,
    /// Downloaded artifacts
    Downloads,
    /// Everything
    All,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };
    let mut config = Config::load(&base_dir).context("Invalid configuration")?;

    match cli.command {
        Commands::Build { release, stage } => {
            if release {
                config.build.profile = Profile::Release;
            }
            commands::cmd_build(&config, BuildOptions { stage })?;
        }

        Commands::Run { release } => {
            if release {
                config.build.profile = Profile::Release;
            }
            commands::cmd_run(&config)?;
        }

        Commands::Download => {
            commands::cmd_download(&config)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowWhat::Config => ShowTarget::Config,
                ShowWhat::Manifest => ShowTarget::Manifest,
                ShowWhat::Archive => ShowTarget::Archive,
            };
            commands::cmd_show(&config, show_target)?;
        }

        Commands::Clean { what } => {
            let clean_target = match what {
                None | Some(CleanWhat::Outputs) => CleanTarget::Outputs,
                Some(CleanWhat::Downloads) => CleanTarget::Downloads,
                Some(CleanWhat::All) => CleanTarget::All,
            };
            commands::cmd_clean(&config, clean_target)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
