//! CLI for the keg formula installer.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use keg_core::cache::DownloadCache;
use keg_core::config::{self, KegConfig};
use keg_core::formula::{self, PackageDescriptor};
use keg_core::receipt::ReceiptStore;
use keg_core::toolchain::GoToolchain;
use keg_core::{InstallError, Installer};
use std::io;
use std::path::{Path, PathBuf};

use commands::{
    run_checksum, run_completions, run_fetch, run_info, run_install, run_list, run_manpage,
    run_test, run_uninstall,
};

/// Top-level CLI for keg.
#[derive(Debug, Parser)]
#[command(name = "keg")]
#[command(about = "keg: build-from-source formula installer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch, verify, build, install and smoke-test a formula.
    Install {
        /// Formula TOML file (default: built-in hydrophone).
        #[arg(long, value_name = "FILE")]
        formula: Option<PathBuf>,
        /// Install prefix; the binary goes to <PREFIX>/bin.
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<PathBuf>,
        /// Neither read nor populate the download cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// Download and verify the source archive into the cache.
    Fetch {
        #[arg(long, value_name = "FILE")]
        formula: Option<PathBuf>,
    },

    /// Smoke-test an installed formula.
    Test {
        #[arg(long, value_name = "FILE")]
        formula: Option<PathBuf>,
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<PathBuf>,
    },

    /// Show a formula's metadata.
    Info {
        #[arg(long, value_name = "FILE")]
        formula: Option<PathBuf>,
    },

    /// List formulae installed under a prefix.
    List {
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<PathBuf>,
    },

    /// Remove an installed binary and its receipt.
    Uninstall {
        #[arg(long, value_name = "FILE")]
        formula: Option<PathBuf>,
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<PathBuf>,
    },

    /// Compute SHA-256 of a file (e.g. a formula's source archive).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },

    /// Print a roff man page to stdout.
    Manpage,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Install {
                formula,
                prefix,
                no_cache,
            } => {
                let cfg = load_config()?;
                let f = load_formula(formula.as_deref())?;
                let installer = build_installer(&cfg, prefix.as_deref(), cfg.cache && !no_cache)?;
                run_install(&installer, &f)?;
            }
            CliCommand::Fetch { formula } => {
                let cfg = load_config()?;
                let f = load_formula(formula.as_deref())?;
                let installer = build_installer(&cfg, None, true)?;
                run_fetch(&installer, &f)?;
            }
            CliCommand::Test { formula, prefix } => {
                let cfg = load_config()?;
                let f = load_formula(formula.as_deref())?;
                let installer = build_installer(&cfg, prefix.as_deref(), false)?;
                run_test(&installer, &f)?;
            }
            CliCommand::Info { formula } => run_info(&load_formula(formula.as_deref())?)?,
            CliCommand::List { prefix } => {
                let cfg = load_config()?;
                let prefix = cfg.resolve_prefix(prefix.as_deref())?;
                run_list(&ReceiptStore::for_prefix(&prefix))?;
            }
            CliCommand::Uninstall { formula, prefix } => {
                let cfg = load_config()?;
                let f = load_formula(formula.as_deref())?;
                let installer = build_installer(&cfg, prefix.as_deref(), false)?;
                run_uninstall(&installer, &f)?;
            }
            CliCommand::Checksum { path } => run_checksum(&path)?,
            CliCommand::Completions { shell } => run_completions(shell, &mut io::stdout())?,
            CliCommand::Manpage => run_manpage(&mut io::stdout())?,
        }

        Ok(())
    }
}

fn load_config() -> Result<KegConfig> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

/// Prefixes the failing stage, e.g. `verify: checksum mismatch: ...`.
pub(crate) fn stage_error(e: InstallError) -> anyhow::Error {
    anyhow::anyhow!("{}: {}", e.stage(), e)
}

/// Formula from `path`, or the built-in hydrophone formula.
pub(crate) fn load_formula(path: Option<&Path>) -> Result<PackageDescriptor> {
    match path {
        Some(p) => PackageDescriptor::load(p).map_err(stage_error),
        None => Ok(formula::hydrophone()),
    }
}

fn build_installer(
    cfg: &KegConfig,
    prefix: Option<&Path>,
    use_cache: bool,
) -> Result<Installer<GoToolchain>> {
    let prefix = cfg.resolve_prefix(prefix)?;
    let receipts = ReceiptStore::for_prefix(&prefix);
    let mut installer = Installer::new(GoToolchain::from_config(cfg), prefix.join("bin"), receipts)
        .with_smoke_timeout(cfg.smoke_timeout());
    if use_cache {
        installer = installer.with_cache(DownloadCache::open_default()?);
    }
    Ok(installer)
}
