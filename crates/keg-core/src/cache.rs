//! Cache of verified source archives, keyed by their SHA-256.
//!
//! Entries are only written after `checksum::verify` passed and are verified
//! again on every read, so a corrupted entry can never reach extraction.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checksum;
use crate::error::{InstallError, Stage};
use crate::formula::PackageDescriptor;

#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache under `~/.cache/keg/downloads`.
    pub fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("keg")?;
        Ok(Self::new(
            xdg_dirs.get_cache_home().join("keg").join("downloads"),
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<sha256>--<name>--<archive file name>`.
    pub fn entry_path(&self, formula: &PackageDescriptor) -> PathBuf {
        self.dir.join(format!(
            "{}--{}--{}",
            formula.checksum.to_ascii_lowercase(),
            formula.name,
            formula.archive_file_name()
        ))
    }

    /// Returns the cached archive if present and still matching its checksum.
    /// Corrupt entries are deleted.
    pub fn load(&self, formula: &PackageDescriptor) -> Option<Vec<u8>> {
        let path = self.entry_path(formula);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("cannot read cached archive {}: {}", path.display(), e);
                return None;
            }
        };
        match checksum::verify(&data, &formula.checksum) {
            Ok(()) => {
                tracing::debug!("cache hit {}", path.display());
                Some(data)
            }
            Err(e) => {
                tracing::warn!("discarding cached archive {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Stores verified archive bytes. Writes a temp file and renames it into
    /// place so readers never see a partial entry.
    pub fn store(&self, formula: &PackageDescriptor, data: &[u8]) -> Result<PathBuf, InstallError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| io_err(format!("create {}", self.dir.display()), e))?;
        let path = self.entry_path(formula);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, data)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                io_err(format!("write cache entry {}", path.display()), e)
            })?;
        Ok(path)
    }
}

/// Cache I/O belongs to the fetch stage.
fn io_err(context: impl Into<String>, source: io::Error) -> InstallError {
    InstallError::io(Stage::Fetch, context, source)
}
