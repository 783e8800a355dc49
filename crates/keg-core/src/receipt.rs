//! Install receipts: the record that a package is installed.
//!
//! A receipt is written only after every pipeline stage succeeded, so the
//! presence of `<name>.json` means a verified, smoke-tested install. Each
//! prefix keeps its own receipts, so installs into different prefixes never
//! see each other's records.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{InstallError, Stage};
use crate::formula::PackageDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: Option<String>,
    pub source_url: String,
    pub sha256: String,
    /// Installed executable.
    pub binary: PathBuf,
    /// Seconds since the Unix epoch.
    pub installed_at: u64,
}

impl InstallReceipt {
    pub fn new(formula: &PackageDescriptor, binary: &Path) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: formula.name.clone(),
            version: formula.resolved_version(),
            source_url: formula.source_url.clone(),
            sha256: formula.checksum.to_ascii_lowercase(),
            binary: binary.to_path_buf(),
            installed_at,
        }
    }
}

/// Directory of `<name>.json` receipts.
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    dir: PathBuf,
}

impl ReceiptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Receipts for binaries installed under `prefix`:
    /// `<prefix>/var/lib/keg/receipts`.
    pub fn for_prefix(prefix: &Path) -> Self {
        Self::new(prefix.join("var").join("lib").join("keg").join("receipts"))
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn write(&self, receipt: &InstallReceipt) -> Result<PathBuf, InstallError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| io_err(format!("create {}", self.dir.display()), e))?;
        let path = self.path_for(&receipt.name);
        let json = serde_json::to_vec_pretty(receipt)
            .map_err(|e| io_err("serialize receipt", io::Error::other(e)))?;
        fs::write(&path, json)
            .map_err(|e| io_err(format!("write {}", path.display()), e))?;
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Option<InstallReceipt>, InstallError> {
        let path = self.path_for(name);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(format!("read {}", path.display()), e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| io_err(format!("parse {}", path.display()), e.into()))
    }

    /// Returns whether a receipt existed.
    pub fn remove(&self, name: &str) -> Result<bool, InstallError> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(format!("remove {}", path.display()), e)),
        }
    }

    /// All readable receipts, sorted by name. Unparseable files are skipped.
    pub fn list(&self) -> Result<Vec<InstallReceipt>, InstallError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(format!("read {}", self.dir.display()), e)),
        };
        let mut receipts = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| io_err(format!("read {}", self.dir.display()), e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path)
                .ok()
                .and_then(|d| serde_json::from_slice::<InstallReceipt>(&d).ok())
            {
                Some(r) => receipts.push(r),
                None => tracing::warn!("skipping unreadable receipt {}", path.display()),
            }
        }
        receipts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(receipts)
    }
}

/// Filesystem errors while recording receipts.
fn io_err(context: impl Into<String>, source: io::Error) -> InstallError {
    InstallError::io(Stage::Install, context, source)
}
