//! Copying the built artifact into the bin directory.
//!
//! The copy goes to a hidden `.partial` file next to the target and is renamed
//! into place, so the final name only ever points at a complete executable.
//! A binary it replaces is parked as `.<name>.previous` until the install is
//! committed or rolled back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, Stage};

/// A freshly installed binary that can still be undone.
#[derive(Debug)]
#[must_use = "call commit() or rollback()"]
pub struct StagedBinary {
    path: PathBuf,
    previous: Option<PathBuf>,
}

impl StagedBinary {
    /// Final location, `<bin_dir>/<name>`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if an existing binary was moved aside.
    pub fn replaced_existing(&self) -> bool {
        self.previous.is_some()
    }

    /// Keeps the new binary and discards the one it replaced.
    pub fn commit(self) -> PathBuf {
        if let Some(previous) = &self.previous {
            if let Err(e) = remove_binary(previous) {
                tracing::warn!("could not remove {}: {}", previous.display(), e);
            }
        }
        self.path
    }

    /// Removes the new binary and puts back the one it replaced, if any.
    pub fn rollback(self) -> Result<(), InstallError> {
        match &self.previous {
            Some(previous) => fs::rename(previous, &self.path).map_err(|e| {
                io_err(
                    format!("restore {} from {}", self.path.display(), previous.display()),
                    e,
                )
            }),
            None => remove_binary(&self.path).map(drop),
        }
    }
}

/// Installs `binary` as `<bin_dir>/<name>`. Creates `bin_dir` if needed. An
/// existing file of that name is kept aside until the result is committed.
pub fn install_binary(
    binary: &Path,
    bin_dir: &Path,
    name: &str,
) -> Result<StagedBinary, InstallError> {
    fs::create_dir_all(bin_dir)
        .map_err(|e| io_err(format!("create {}", bin_dir.display()), e))?;

    let target = bin_dir.join(name);
    let partial = bin_dir.join(format!(".{}.partial", name));
    let backup = bin_dir.join(format!(".{}.previous", name));

    let copied = fs::copy(binary, &partial)
        .map_err(|e| {
            io_err(
                format!("copy {} to {}", binary.display(), partial.display()),
                e,
            )
        })
        .and_then(|_| make_executable(&partial));
    if let Err(e) = copied {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    let previous = match fs::symlink_metadata(&target) {
        Ok(_) => {
            if let Err(e) = fs::rename(&target, &backup) {
                let _ = fs::remove_file(&partial);
                return Err(io_err(
                    format!("move {} to {}", target.display(), backup.display()),
                    e,
                ));
            }
            Some(backup)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(io_err(format!("stat {}", target.display()), e));
        }
    };

    if let Err(e) = fs::rename(&partial, &target) {
        let _ = fs::remove_file(&partial);
        if let Some(previous) = &previous {
            let _ = fs::rename(previous, &target);
        }
        return Err(io_err(
            format!("rename {} to {}", partial.display(), target.display()),
            e,
        ));
    }

    tracing::info!("installed {}", target.display());
    Ok(StagedBinary {
        path: target,
        previous,
    })
}

/// Removes an installed binary. A missing file is not an error; returns
/// whether something was removed.
pub fn remove_binary(path: &Path) -> Result<bool, InstallError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(format!("remove {}", path.display()), e)),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| io_err(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}

fn io_err(context: impl Into<String>, source: io::Error) -> InstallError {
    InstallError::io(Stage::Install, context, source)
}
