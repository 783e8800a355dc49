//! Formula descriptors: what to fetch, how to build it, and how to check it.
//!
//! A `PackageDescriptor` is built once (either the built-in formula or a TOML
//! file) and is read-only for the rest of the install.

mod builtin;
mod version;

pub use builtin::hydrophone;
pub use version::version_from_url;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use url::Url;

use crate::checksum;
use crate::error::{InstallError, Stage};

/// URL schemes accepted for source archives.
const SOURCE_SCHEMES: &[&str] = &["https", "http", "file"];

/// Help invocation run after install, and the literal text it must print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeTest {
    /// Arguments passed to the installed binary.
    #[serde(default = "default_smoke_args")]
    pub args: Vec<String>,
    /// Literal, case-sensitive substring expected on standard output.
    pub expect: String,
}

fn default_smoke_args() -> Vec<String> {
    vec!["--help".to_string()]
}

/// Static description of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name; also the installed binary's file name.
    pub name: String,
    pub description: String,
    pub homepage: String,
    /// Source archive (gzip-compressed tar).
    pub source_url: String,
    /// Expected SHA-256 of the archive bytes, hex.
    pub checksum: String,
    /// SPDX license identifier.
    pub license: String,
    /// Tools that must be on `PATH` to build (e.g. `go`).
    #[serde(default)]
    pub build_dependencies: BTreeSet<String>,
    /// Explicit version; detected from `source_url` when absent.
    #[serde(default)]
    pub version: Option<String>,
    /// Linker flags handed to the toolchain.
    #[serde(default)]
    pub ldflags: Vec<String>,
    pub smoke_test: SmokeTest,
}

impl PackageDescriptor {
    /// Parse a descriptor from TOML and validate it.
    pub fn from_toml_str(data: &str) -> Result<Self, InstallError> {
        let descriptor: PackageDescriptor =
            toml::from_str(data).map_err(|e| InstallError::Formula(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Load and validate a descriptor from a TOML file.
    pub fn load(path: &Path) -> Result<Self, InstallError> {
        let data = fs::read_to_string(path)
            .map_err(|e| {
                InstallError::io(Stage::Formula, format!("read formula {}", path.display()), e)
            })?;
        Self::from_toml_str(&data).map_err(|e| match e {
            InstallError::Formula(msg) => {
                InstallError::Formula(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Version string: explicit `version`, else detected from the source URL.
    pub fn resolved_version(&self) -> Option<String> {
        self.version
            .clone()
            .or_else(|| version_from_url(&self.source_url))
    }

    /// Checks every field the pipeline relies on. Run before any stage.
    pub fn validate(&self) -> Result<(), InstallError> {
        validate_name(&self.name)?;

        Url::parse(&self.homepage)
            .map_err(|e| InstallError::Formula(format!("homepage {:?}: {}", self.homepage, e)))?;

        let source = Url::parse(&self.source_url).map_err(|e| {
            InstallError::Formula(format!("source_url {:?}: {}", self.source_url, e))
        })?;
        if !SOURCE_SCHEMES.contains(&source.scheme()) {
            return Err(InstallError::Formula(format!(
                "source_url scheme {:?} not supported (expected one of {})",
                source.scheme(),
                SOURCE_SCHEMES.join(", ")
            )));
        }

        if !checksum::is_sha256_hex(&self.checksum) {
            return Err(InstallError::Formula(format!(
                "checksum must be {} hex characters, got {} ({:?})",
                checksum::SHA256_HEX_LEN,
                self.checksum.len(),
                self.checksum
            )));
        }

        if self.license.trim().is_empty() {
            return Err(InstallError::Formula("license is empty".to_string()));
        }
        if self.smoke_test.expect.is_empty() {
            return Err(InstallError::Formula(
                "smoke_test.expect is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Last path segment of the source URL (e.g. `v0.5.0.tar.gz`).
    pub fn archive_file_name(&self) -> String {
        Url::parse(&self.source_url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segs| segs.next_back().map(str::to_string))
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "source.tar.gz".to_string())
    }
}

fn validate_name(name: &str) -> Result<(), InstallError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(InstallError::Formula(format!("invalid name {:?}", name)));
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
    if !ok {
        return Err(InstallError::Formula(format!(
            "name {:?} may only contain letters, digits, '.', '_', '+' and '-'",
            name
        )));
    }
    Ok(())
}
