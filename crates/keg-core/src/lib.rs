pub mod config;
pub mod logging;

pub mod archive;
pub mod cache;
pub mod checksum;
pub mod error;
pub mod fetch;
pub mod formula;
pub mod install;
pub mod pipeline;
pub mod process;
pub mod receipt;
pub mod smoke;
pub mod toolchain;

pub use error::{InstallError, Stage};
pub use formula::PackageDescriptor;
pub use pipeline::{InstallReport, Installer};
