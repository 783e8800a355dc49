//! Build toolchain capability.
//!
//! The pipeline only talks to the outside world (network, archive format,
//! compiler) through `Toolchain`, so it can be driven by a fake in tests.

mod deps;
mod go;

pub use deps::find_executable;
pub use go::{go_build_args, GoToolchain};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::archive::SourceTree;
use crate::error::InstallError;

/// What the toolchain should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Package (and binary) name.
    pub name: String,
    /// Linker flags, e.g. `["-s", "-w"]`.
    pub ldflags: Vec<String>,
    /// Where the executable must be written.
    pub output: PathBuf,
}

pub trait Toolchain {
    /// Downloads the source archive.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallError>;

    /// Unpacks verified archive bytes under `dest`.
    fn extract(&self, data: &[u8], dest: &Path) -> Result<SourceTree, InstallError>;

    /// Builds `tree` and returns the path of the produced executable.
    fn build(&self, tree: &SourceTree, request: &BuildRequest) -> Result<PathBuf, InstallError>;

    /// Fails with `Build` if a declared build dependency is unavailable.
    /// Called before anything is fetched.
    fn check_build_dependencies(&self, deps: &BTreeSet<String>) -> Result<(), InstallError> {
        let _ = deps;
        Ok(())
    }
}
