//! The install pipeline: fetch → verify → extract → build → install → smoke-test.
//!
//! Strictly linear and non-retrying. The first failing stage aborts the rest,
//! the ephemeral build directory is removed on every exit path, and nothing is
//! recorded as installed unless the smoke test passed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DownloadCache;
use crate::checksum;
use crate::error::{InstallError, Stage};
use crate::formula::PackageDescriptor;
use crate::install;
use crate::receipt::{InstallReceipt, ReceiptStore};
use crate::smoke;
use crate::toolchain::{BuildRequest, Toolchain};

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub binary: PathBuf,
    pub receipt: PathBuf,
    /// Line of help output that matched the smoke test.
    pub matched_line: String,
    /// True when the archive came from the download cache.
    pub from_cache: bool,
}

pub struct Installer<T: Toolchain> {
    toolchain: T,
    bin_dir: PathBuf,
    receipts: ReceiptStore,
    cache: Option<DownloadCache>,
    smoke_timeout: Duration,
}

impl<T: Toolchain> Installer<T> {
    pub fn new(toolchain: T, bin_dir: impl Into<PathBuf>, receipts: ReceiptStore) -> Self {
        Self {
            toolchain,
            bin_dir: bin_dir.into(),
            receipts,
            cache: None,
            smoke_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_cache(mut self, cache: DownloadCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_smoke_timeout(mut self, timeout: Duration) -> Self {
        self.smoke_timeout = timeout;
        self
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn receipts(&self) -> &ReceiptStore {
        &self.receipts
    }

    pub fn cache(&self) -> Option<&DownloadCache> {
        self.cache.as_ref()
    }

    /// Where `formula`'s binary lives once installed.
    pub fn binary_path(&self, formula: &PackageDescriptor) -> PathBuf {
        self.bin_dir.join(&formula.name)
    }

    /// Runs the full pipeline for `formula`.
    ///
    /// A binary already installed under the same name is only replaced once
    /// the new one passed the smoke test; on failure it and its receipt are
    /// restored.
    pub fn install(&self, formula: &PackageDescriptor) -> Result<InstallReport, InstallError> {
        formula.validate()?;
        self.toolchain
            .check_build_dependencies(&formula.build_dependencies)?;

        let (archive, from_cache) = self.fetch_verified(formula)?;

        let build_dir = tempfile::Builder::new()
            .prefix(&format!("keg-{}-", formula.name))
            .tempdir()
            .map_err(|e| InstallError::io(Stage::Extract, "create build directory", e))?;
        tracing::debug!("build directory {}", build_dir.path().display());

        let tree = self
            .toolchain
            .extract(&archive, &build_dir.path().join("src"))?;
        drop(archive);

        let request = BuildRequest {
            name: formula.name.clone(),
            ldflags: formula.ldflags.clone(),
            output: build_dir.path().join("out").join(&formula.name),
        };
        let built = self.toolchain.build(&tree, &request)?;

        let previous_receipt = self.receipts.read(&formula.name).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable receipt for {}: {}", formula.name, e);
            None
        });
        let staged = install::install_binary(&built, &self.bin_dir, &formula.name)?;

        if let Err(e) = build_dir.close() {
            tracing::warn!("failed to remove build directory: {}", e);
        }

        let installed = staged.path().to_path_buf();
        let recorded = self
            .check_binary(formula, &installed)
            .and_then(|matched| {
                let receipt = InstallReceipt::new(formula, &installed);
                self.receipts.write(&receipt).map(|path| (matched, path))
            });
        let (matched_line, receipt) = match recorded {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("rolling back {}: {}", installed.display(), e);
                if let Err(rb) = staged.rollback() {
                    tracing::error!("rollback of {} failed: {}", installed.display(), rb);
                }
                let restored = match &previous_receipt {
                    Some(previous) => self.receipts.write(previous).map(drop),
                    None => self.receipts.remove(&formula.name).map(drop),
                };
                if let Err(rb) = restored {
                    tracing::error!("restoring receipt for {} failed: {}", formula.name, rb);
                }
                return Err(e);
            }
        };
        let binary = staged.commit();

        tracing::info!(
            from_cache,
            "installed {} {}",
            formula.name,
            formula.resolved_version().unwrap_or_default()
        );
        Ok(InstallReport {
            binary,
            receipt,
            matched_line,
            from_cache,
        })
    }

    /// Fetch and verify only. Returns the archive and whether it came from
    /// the cache. Freshly fetched, verified bytes are added to the cache.
    pub fn fetch(&self, formula: &PackageDescriptor) -> Result<(Vec<u8>, bool), InstallError> {
        formula.validate()?;
        self.fetch_verified(formula)
    }

    fn fetch_verified(
        &self,
        formula: &PackageDescriptor,
    ) -> Result<(Vec<u8>, bool), InstallError> {
        if let Some(data) = self.cache.as_ref().and_then(|c| c.load(formula)) {
            return Ok((data, true));
        }

        tracing::info!("fetching {}", formula.source_url);
        let data = self.toolchain.fetch(&formula.source_url)?;
        checksum::verify(&data, &formula.checksum)?;
        tracing::debug!(bytes = data.len(), "checksum verified");

        if let Some(cache) = &self.cache {
            // A cache write failure must not fail an otherwise good install.
            if let Err(e) = cache.store(formula, &data) {
                tracing::warn!("could not cache archive: {}", e);
            }
        }
        Ok((data, false))
    }

    /// Smoke-tests the already installed binary; returns the matched line.
    pub fn smoke_test(&self, formula: &PackageDescriptor) -> Result<String, InstallError> {
        let binary = self.binary_path(formula);
        if !binary.is_file() {
            return Err(InstallError::io(
                Stage::SmokeTest,
                format!("{} is not installed", formula.name),
                std::io::Error::new(std::io::ErrorKind::NotFound, binary.display().to_string()),
            ));
        }
        self.check_binary(formula, &binary)
    }

    /// Removes `<bin_dir>/<name>` and its receipt. A receipt that records a
    /// binary somewhere else is left alone. Returns whether anything was
    /// removed.
    pub fn uninstall(&self, formula: &PackageDescriptor) -> Result<bool, InstallError> {
        let binary = self.binary_path(formula);
        let removed_binary = install::remove_binary(&binary)?;
        let removed_receipt = match self.receipts.read(&formula.name)? {
            Some(r) if r.binary == binary => self.receipts.remove(&formula.name)?,
            Some(r) => {
                tracing::debug!(
                    "keeping receipt for {} at {}",
                    formula.name,
                    r.binary.display()
                );
                false
            }
            None => false,
        };
        Ok(removed_binary || removed_receipt)
    }

    fn check_binary(
        &self,
        formula: &PackageDescriptor,
        binary: &Path,
    ) -> Result<String, InstallError> {
        let text = smoke::run_help(binary, &formula.smoke_test.args, self.smoke_timeout)?;
        let line = smoke::assert_contains(&text, &formula.smoke_test.expect)?;
        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests;
