//! Source archive extraction (`.tar.gz`).

use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, Stage};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Unpacked sources ready for the toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    /// Directory to build in. For archives with a single top-level directory
    /// (`hydrophone-0.5.0/...`) this is that directory.
    pub root: PathBuf,
}

fn archive_err(msg: impl std::fmt::Display) -> InstallError {
    InstallError::Archive(msg.to_string())
}

/// Unpacks a gzip-compressed tar archive into `dest`.
///
/// Empty input, non-gzip data, truncated or corrupt streams, archives without
/// entries, and entries that would land outside `dest` are all `Archive`
/// errors. `dest` is created if missing.
pub fn extract_tar_gz(data: &[u8], dest: &Path) -> Result<SourceTree, InstallError> {
    if data.is_empty() {
        return Err(archive_err("archive is empty"));
    }
    if !data.starts_with(&GZIP_MAGIC) {
        return Err(archive_err(
            "unsupported archive format: expected a gzip-compressed tar",
        ));
    }
    fs::create_dir_all(dest)
        .map_err(|e| io_err(format!("create {}", dest.display()), e))?;

    let mut archive = tar::Archive::new(GzDecoder::new(data));
    let mut unpacked = 0usize;
    for entry in archive
        .entries()
        .map_err(|e| archive_err(format_args!("corrupt archive: {}", e)))?
    {
        let mut entry = entry.map_err(|e| archive_err(format_args!("corrupt archive: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| archive_err(format_args!("bad entry path: {}", e)))?
            .into_owned();
        let inside = entry
            .unpack_in(dest)
            .map_err(|e| archive_err(format_args!("unpack {}: {}", path.display(), e)))?;
        if !inside {
            return Err(archive_err(format_args!(
                "entry {} escapes the extraction directory",
                path.display()
            )));
        }
        unpacked += 1;
    }

    // tar stops at the end-of-archive marker; drain the rest so a truncated
    // gzip trailer is still caught.
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink())
        .map_err(|e| archive_err(format_args!("corrupt archive: {}", e)))?;

    if unpacked == 0 {
        return Err(archive_err("archive contains no entries"));
    }
    tracing::debug!(entries = unpacked, "extracted archive into {}", dest.display());

    Ok(SourceTree {
        root: source_root(dest)?,
    })
}

/// The single top-level directory of `dest`, or `dest` itself.
fn source_root(dest: &Path) -> Result<PathBuf, InstallError> {
    let mut entries = fs::read_dir(dest)
        .map_err(|e| io_err(format!("read {}", dest.display()), e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| io_err(format!("read {}", dest.display()), e))?;
    if entries.len() == 1 {
        let only = entries.remove(0);
        let is_dir = only
            .file_type()
            .map_err(|e| io_err(format!("stat {}", only.path().display()), e))?
            .is_dir();
        if is_dir {
            return Ok(only.path());
        }
    }
    Ok(dest.to_path_buf())
}

fn io_err(context: impl Into<String>, source: io::Error) -> InstallError {
    InstallError::io(Stage::Extract, context, source)
}
