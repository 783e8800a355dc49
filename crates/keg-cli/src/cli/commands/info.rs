//! `keg info` – print a formula's metadata.

use anyhow::Result;
use keg_core::PackageDescriptor;
use std::io::{self, Write};

pub fn run_info(formula: &PackageDescriptor) -> Result<()> {
    write_info(formula, &mut io::stdout().lock())
}

pub(crate) fn write_info(formula: &PackageDescriptor, out: &mut impl Write) -> Result<()> {
    let version = formula.resolved_version().unwrap_or_else(|| "-".to_string());
    writeln!(out, "{} {}", formula.name, version)?;
    writeln!(out, "{}", formula.description)?;
    writeln!(out, "{}", formula.homepage)?;
    writeln!(out, "License:  {}", formula.license)?;
    writeln!(out, "Source:   {}", formula.source_url)?;
    writeln!(out, "SHA-256:  {}", formula.checksum)?;
    if !formula.build_dependencies.is_empty() {
        let deps: Vec<&str> = formula.build_dependencies.iter().map(String::as_str).collect();
        writeln!(out, "Build:    {}", deps.join(", "))?;
    }
    if !formula.ldflags.is_empty() {
        writeln!(out, "ldflags:  {}", formula.ldflags.join(" "))?;
    }
    writeln!(
        out,
        "Test:     {} {} => {:?}",
        formula.name,
        formula.smoke_test.args.join(" "),
        formula.smoke_test.expect
    )?;
    Ok(())
}
