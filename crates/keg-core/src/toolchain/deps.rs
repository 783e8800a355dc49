//! `PATH` lookup for build dependencies.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Resolves `program` to an executable file.
///
/// Names containing a path separator are checked as-is; bare names are
/// searched in each `PATH` entry.
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return is_executable(program).then(|| program.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    find_in(program.as_os_str(), &path)
}

fn find_in(program: &OsStr, path: &OsStr) -> Option<PathBuf> {
    env::split_paths(path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
