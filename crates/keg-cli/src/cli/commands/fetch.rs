//! `keg fetch` – download and verify a formula's archive into the cache.

use anyhow::{Context, Result};
use keg_core::toolchain::Toolchain;
use keg_core::{Installer, PackageDescriptor};

use crate::cli::stage_error;

pub fn run_fetch<T: Toolchain>(
    installer: &Installer<T>,
    formula: &PackageDescriptor,
) -> Result<()> {
    let (_, from_cache) = installer.fetch(formula).map_err(stage_error)?;
    let path = installer
        .cache()
        .map(|c| c.entry_path(formula))
        .context("download cache is not configured")?;
    if from_cache {
        tracing::debug!("{} already cached", formula.name);
    }
    println!("{}  {}", formula.checksum.to_ascii_lowercase(), path.display());
    Ok(())
}
