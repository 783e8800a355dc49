//! `keg list` – show install receipts.

use anyhow::Result;
use keg_core::receipt::ReceiptStore;

pub fn run_list(receipts: &ReceiptStore) -> Result<()> {
    let installed = receipts.list()?;
    if installed.is_empty() {
        println!("Nothing installed.");
    } else {
        println!("{:<16} {:<10} {}", "NAME", "VERSION", "BINARY");
        for r in installed {
            println!(
                "{:<16} {:<10} {}",
                r.name,
                r.version.as_deref().unwrap_or("-"),
                r.binary.display()
            );
        }
    }
    Ok(())
}
