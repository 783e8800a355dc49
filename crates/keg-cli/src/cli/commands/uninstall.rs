//! `keg uninstall` – remove a formula's binary and receipt.

use anyhow::Result;
use keg_core::toolchain::Toolchain;
use keg_core::{Installer, PackageDescriptor};

use crate::cli::stage_error;

pub fn run_uninstall<T: Toolchain>(
    installer: &Installer<T>,
    formula: &PackageDescriptor,
) -> Result<()> {
    if installer.uninstall(formula).map_err(stage_error)? {
        println!("Uninstalled {}.", formula.name);
    } else {
        println!("{} is not installed.", formula.name);
    }
    Ok(())
}
