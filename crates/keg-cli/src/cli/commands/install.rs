//! `keg install` – run the whole pipeline for one formula.

use anyhow::Result;
use keg_core::toolchain::Toolchain;
use keg_core::{Installer, PackageDescriptor};

use crate::cli::stage_error;

pub fn run_install<T: Toolchain>(
    installer: &Installer<T>,
    formula: &PackageDescriptor,
) -> Result<()> {
    let report = installer.install(formula).map_err(stage_error)?;
    println!(
        "Installed {} {} -> {}",
        formula.name,
        formula.resolved_version().unwrap_or_default(),
        report.binary.display()
    );
    if report.from_cache {
        println!("  source: cached archive");
    }
    println!("  smoke test: {}", report.matched_line);
    Ok(())
}
