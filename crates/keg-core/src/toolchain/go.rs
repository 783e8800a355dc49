//! Go toolchain: curl download, tar.gz extraction, `go build`.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{find_executable, BuildRequest, Toolchain};
use crate::archive::{self, SourceTree};
use crate::config::KegConfig;
use crate::error::{InstallError, Stage};
use crate::fetch::{self, FetchOptions};
use crate::process;

/// Real toolchain used by the CLI.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    /// `go` binary (bare name resolved via `PATH`, or a path).
    pub go: PathBuf,
    pub fetch: FetchOptions,
    pub build_timeout: Duration,
}

impl Default for GoToolchain {
    fn default() -> Self {
        Self {
            go: PathBuf::from("go"),
            fetch: FetchOptions::default(),
            build_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl GoToolchain {
    pub fn from_config(cfg: &KegConfig) -> Self {
        Self {
            go: cfg.build.go.clone(),
            fetch: cfg.fetch.options(),
            build_timeout: Duration::from_secs(cfg.build.timeout_secs),
        }
    }
}

/// Arguments for `go build`: reproducible paths, explicit output, linker flags.
pub fn go_build_args(request: &BuildRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "build".into(),
        "-trimpath".into(),
        "-o".into(),
        request.output.clone().into_os_string(),
    ];
    if !request.ldflags.is_empty() {
        args.push(format!("-ldflags={}", request.ldflags.join(" ")).into());
    }
    args
}

impl Toolchain for GoToolchain {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        fetch::fetch_url(url, &self.fetch)
    }

    fn extract(&self, data: &[u8], dest: &Path) -> Result<SourceTree, InstallError> {
        archive::extract_tar_gz(data, dest)
    }

    fn build(&self, tree: &SourceTree, request: &BuildRequest) -> Result<PathBuf, InstallError> {
        if let Some(parent) = request.output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| {
                    InstallError::io(Stage::Build, format!("create {}", parent.display()), e)
                })?;
        }

        let mut cmd = Command::new(&self.go);
        cmd.args(go_build_args(request)).current_dir(&tree.root);
        tracing::info!(
            "building {} with {} in {}",
            request.name,
            self.go.display(),
            tree.root.display()
        );

        let out = process::run_with_deadline(&mut cmd, self.build_timeout).map_err(|e| {
            InstallError::Build {
                message: format!("go build: {}", e),
                status: None,
                output: e.captured(),
            }
        })?;
        if !out.status.success() {
            return Err(InstallError::Build {
                message: format!("go build exited with {}", out.status),
                status: out.status.code(),
                output: out.combined(),
            });
        }
        if !request.output.is_file() {
            return Err(InstallError::Build {
                message: format!(
                    "go build succeeded but produced nothing at {}",
                    request.output.display()
                ),
                status: out.status.code(),
                output: out.combined(),
            });
        }
        Ok(request.output.clone())
    }

    fn check_build_dependencies(&self, deps: &BTreeSet<String>) -> Result<(), InstallError> {
        for dep in deps {
            let program = if dep == "go" {
                self.go.clone()
            } else {
                PathBuf::from(dep)
            };
            match find_executable(&program) {
                Some(found) => tracing::debug!("build dependency {} -> {}", dep, found.display()),
                None => {
                    return Err(InstallError::Build {
                        message: format!(
                            "build dependency {:?} not found (looked for {})",
                            dep,
                            program.display()
                        ),
                        status: None,
                        output: String::new(),
                    })
                }
            }
        }
        Ok(())
    }
}
