use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::FetchOptions;

/// Download limits (`[fetch]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    /// Deadline for the whole download.
    pub timeout_secs: u64,
    /// Largest archive accepted, in bytes.
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let d = FetchOptions::default();
        Self {
            connect_timeout_secs: d.connect_timeout.as_secs(),
            timeout_secs: d.timeout.as_secs(),
            max_bytes: d.max_bytes,
        }
    }
}

impl FetchConfig {
    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            max_bytes: self.max_bytes,
        }
    }
}

/// Toolchain settings (`[build]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// `go` binary: bare name looked up on PATH, or an absolute path.
    pub go: PathBuf,
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            go: PathBuf::from("go"),
            timeout_secs: 30 * 60,
        }
    }
}

/// Smoke test settings (`[smoke]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    pub timeout_secs: u64,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Global configuration loaded from `~/.config/keg/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KegConfig {
    /// Install prefix; binaries go to `<prefix>/bin`. Defaults to the parent
    /// of the XDG data home (usually `~/.local`).
    pub prefix: Option<PathBuf>,
    /// Keep verified archives in the XDG cache dir.
    pub cache: bool,
    pub fetch: FetchConfig,
    pub build: BuildConfig,
    pub smoke: SmokeConfig,
}

impl Default for KegConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            cache: true,
            fetch: FetchConfig::default(),
            build: BuildConfig::default(),
            smoke: SmokeConfig::default(),
        }
    }
}

impl KegConfig {
    /// Install prefix: `override_prefix`, then the configured one, then the
    /// parent of the XDG data home.
    pub fn resolve_prefix(&self, override_prefix: Option<&Path>) -> Result<PathBuf> {
        if let Some(p) = override_prefix.or(self.prefix.as_deref()) {
            return Ok(p.to_path_buf());
        }
        let data_home = xdg::BaseDirectories::new()?.get_data_home();
        data_home
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("no parent for data home {}", data_home.display()))
    }

    /// `<prefix>/bin`.
    pub fn bin_dir(&self, override_prefix: Option<&Path>) -> Result<PathBuf> {
        Ok(self.resolve_prefix(override_prefix)?.join("bin"))
    }

    pub fn smoke_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke.timeout_secs)
    }

    /// Rejects zero limits. Every timeout is a hard deadline; there is no
    /// "unlimited" value.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("fetch.connect_timeout_secs", self.fetch.connect_timeout_secs),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
            ("fetch.max_bytes", self.fetch.max_bytes),
            ("build.timeout_secs", self.build.timeout_secs),
            ("smoke.timeout_secs", self.smoke.timeout_secs),
        ];
        for (key, value) in limits {
            if value == 0 {
                bail!("{} must be greater than 0", key);
            }
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("keg")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<KegConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Like `load_or_init` but at an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<KegConfig> {
    if !path.exists() {
        let default_cfg = KegConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: KegConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
