use super::*;
use crate::archive::{self, tests::tar_gz, SourceTree};
use crate::error::Stage;
use crate::formula::hydrophone;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;

const BANNER: &str = "Hydrophone is a lightweight runner for kubernetes tests";

/// Canned toolchain: serves a fixed archive and "builds" a shell script that
/// prints `help`.
struct FakeToolchain {
    archive: Vec<u8>,
    help: String,
    missing_dependency: Option<String>,
    fail_build: bool,
    calls: RefCell<Vec<&'static str>>,
    build_dirs: RefCell<Vec<PathBuf>>,
}

impl FakeToolchain {
    fn new(archive: Vec<u8>, help: &str) -> Self {
        Self {
            archive,
            help: help.to_string(),
            missing_dependency: None,
            fail_build: false,
            calls: RefCell::new(Vec::new()),
            build_dirs: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }
}

impl Toolchain for FakeToolchain {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, InstallError> {
        self.calls.borrow_mut().push("fetch");
        Ok(self.archive.clone())
    }

    fn extract(&self, data: &[u8], dest: &Path) -> Result<SourceTree, InstallError> {
        self.calls.borrow_mut().push("extract");
        if let Some(parent) = dest.parent() {
            self.build_dirs.borrow_mut().push(parent.to_path_buf());
        }
        archive::extract_tar_gz(data, dest)
    }

    fn build(&self, tree: &SourceTree, request: &BuildRequest) -> Result<PathBuf, InstallError> {
        self.calls.borrow_mut().push("build");
        assert!(tree.root.join("main.go").is_file());
        assert_eq!(request.ldflags, ["-s", "-w"]);
        if self.fail_build {
            return Err(InstallError::Build {
                message: "go build exited with exit status: 1".to_string(),
                status: Some(1),
                output: "main.go:1: syntax error".to_string(),
            });
        }
        let parent = request.output.parent().unwrap();
        fs::create_dir_all(parent).unwrap();
        fs::write(
            &request.output,
            format!("#!/bin/sh\ncat <<'EOF'\n{}\nEOF\n", self.help),
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&request.output, fs::Permissions::from_mode(0o755)).unwrap();
        }
        Ok(request.output.clone())
    }

    fn check_build_dependencies(&self, _deps: &BTreeSet<String>) -> Result<(), InstallError> {
        match &self.missing_dependency {
            Some(dep) => Err(InstallError::Build {
                message: format!("build dependency {:?} not found", dep),
                status: None,
                output: String::new(),
            }),
            None => Ok(()),
        }
    }
}

fn source_archive() -> Vec<u8> {
    tar_gz(&[
        (
            "hydrophone-0.5.0/go.mod",
            b"module sigs.k8s.io/hydrophone\n".as_slice(),
        ),
        (
            "hydrophone-0.5.0/main.go",
            b"package main\n\nfunc main() {}\n".as_slice(),
        ),
    ])
}

/// Hydrophone formula whose checksum matches `archive`.
fn formula_for(archive: &[u8]) -> PackageDescriptor {
    PackageDescriptor {
        checksum: checksum::sha256_bytes(archive),
        ..hydrophone()
    }
}

struct Env {
    _root: tempfile::TempDir,
    bin_dir: PathBuf,
    receipts_dir: PathBuf,
    cache_dir: PathBuf,
}

fn env() -> Env {
    let root = tempfile::tempdir().unwrap();
    Env {
        bin_dir: root.path().join("prefix").join("bin"),
        receipts_dir: root.path().join("receipts"),
        cache_dir: root.path().join("cache"),
        _root: root,
    }
}

fn installer(env: &Env, toolchain: FakeToolchain) -> Installer<FakeToolchain> {
    Installer::new(toolchain, &env.bin_dir, ReceiptStore::new(&env.receipts_dir))
        .with_smoke_timeout(Duration::from_secs(10))
}

#[cfg(unix)]
#[test]
fn happy_path_installs_smoke_tests_and_records() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);
    let inst = installer(&env, FakeToolchain::new(archive, &format!("{BANNER}.\n\nUsage:")));

    let report = inst.install(&formula).unwrap();

    assert_eq!(report.binary, env.bin_dir.join("hydrophone"));
    assert!(report.binary.is_file());
    assert_eq!(report.matched_line, format!("{BANNER}."));
    assert!(!report.from_cache);
    assert_eq!(inst.toolchain().calls(), ["fetch", "extract", "build"]);

    let receipt = inst.receipts().read("hydrophone").unwrap().unwrap();
    assert_eq!(receipt.binary, report.binary);
    assert_eq!(receipt.sha256, formula.checksum);
    assert_eq!(receipt.version.as_deref(), Some("0.5.0"));
}

#[test]
fn checksum_mismatch_stops_before_extract() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(b"some other archive");
    let inst = installer(&env, FakeToolchain::new(archive, BANNER));

    let err = inst.install(&formula).unwrap_err();

    assert!(matches!(err, InstallError::ChecksumMismatch { .. }), "{err:?}");
    assert_eq!(err.stage(), Stage::Verify);
    assert_eq!(inst.toolchain().calls(), ["fetch"]);
    assert!(!env.bin_dir.join("hydrophone").exists());
    assert!(inst.receipts().read("hydrophone").unwrap().is_none());
}

#[test]
fn empty_download_fails_at_extract() {
    let env = env();
    let formula = formula_for(b"");
    let inst = installer(&env, FakeToolchain::new(Vec::new(), BANNER));

    let err = inst.install(&formula).unwrap_err();

    assert!(matches!(err, InstallError::Archive(_)), "{err:?}");
    assert_eq!(inst.toolchain().calls(), ["fetch", "extract"]);
    assert!(!env.bin_dir.join("hydrophone").exists());
}

#[test]
fn truncated_download_fails_at_extract() {
    let env = env();
    let full = source_archive();
    let truncated = full[..full.len() / 2].to_vec();
    let formula = formula_for(&truncated);
    let inst = installer(&env, FakeToolchain::new(truncated, BANNER));

    let err = inst.install(&formula).unwrap_err();

    assert_eq!(err.stage(), Stage::Extract, "{err:?}");
    assert!(!inst.toolchain().calls().contains(&"build"));
}

#[cfg(unix)]
#[test]
fn smoke_failure_rolls_back_binary_and_receipt() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);
    let inst = installer(&env, FakeToolchain::new(archive, "Usage: hydrophone [flags]"));

    let err = inst.install(&formula).unwrap_err();

    match &err {
        InstallError::Assertion { expected, output } => {
            assert_eq!(expected, BANNER);
            assert!(output.contains("Usage: hydrophone [flags]"));
        }
        other => panic!("expected Assertion, got {other:?}"),
    }
    assert!(!env.bin_dir.join("hydrophone").exists());
    assert!(inst.receipts().read("hydrophone").unwrap().is_none());
}

#[test]
fn build_failure_propagates_status_and_output() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);
    let mut tc = FakeToolchain::new(archive, BANNER);
    tc.fail_build = true;
    let inst = installer(&env, tc);

    match inst.install(&formula).unwrap_err() {
        InstallError::Build { status, output, .. } => {
            assert_eq!(status, Some(1));
            assert!(output.contains("syntax error"));
        }
        other => panic!("expected Build, got {other:?}"),
    }
    assert!(!env.bin_dir.join("hydrophone").exists());
}

#[cfg(unix)]
#[test]
fn build_directory_is_removed_on_success_and_failure() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);

    let ok = installer(&env, FakeToolchain::new(archive.clone(), BANNER));
    ok.install(&formula).unwrap();

    let mut failing = FakeToolchain::new(archive, BANNER);
    failing.fail_build = true;
    let failed = installer(&env, failing);
    failed.install(&formula).unwrap_err();

    let dirs: Vec<PathBuf> = ok
        .toolchain()
        .build_dirs
        .borrow()
        .iter()
        .chain(failed.toolchain().build_dirs.borrow().iter())
        .cloned()
        .collect();
    assert_eq!(dirs.len(), 2);
    for dir in dirs {
        assert!(!dir.exists(), "{} should be gone", dir.display());
    }
}

#[cfg(unix)]
#[test]
fn reinstall_produces_identical_binary() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);

    let first = installer(&env, FakeToolchain::new(archive.clone(), BANNER));
    let a = fs::read(first.install(&formula).unwrap().binary).unwrap();
    let second = installer(&env, FakeToolchain::new(archive, BANNER));
    let b = fs::read(second.install(&formula).unwrap().binary).unwrap();

    assert_eq!(a, b);
}

#[cfg(unix)]
#[test]
fn cached_archive_skips_fetch() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);

    let first = installer(&env, FakeToolchain::new(archive.clone(), BANNER))
        .with_cache(DownloadCache::new(&env.cache_dir));
    assert!(!first.install(&formula).unwrap().from_cache);

    let second = installer(&env, FakeToolchain::new(archive, BANNER))
        .with_cache(DownloadCache::new(&env.cache_dir));
    let report = second.install(&formula).unwrap();
    assert!(report.from_cache);
    assert_eq!(second.toolchain().calls(), ["extract", "build"]);
}

#[test]
fn corrupt_download_is_never_cached() {
    let env = env();
    let formula = formula_for(b"expected bytes");
    let inst = installer(&env, FakeToolchain::new(b"evil bytes".to_vec(), BANNER))
        .with_cache(DownloadCache::new(&env.cache_dir));

    inst.fetch(&formula).unwrap_err();

    assert!(!inst.cache().unwrap().entry_path(&formula).exists());
}

#[test]
fn missing_build_dependency_stops_before_fetch() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);
    let mut tc = FakeToolchain::new(archive, BANNER);
    tc.missing_dependency = Some("go".to_string());
    let inst = installer(&env, tc);

    let err = inst.install(&formula).unwrap_err();

    assert_eq!(err.stage(), Stage::Build);
    assert!(inst.toolchain().calls().is_empty());
}

#[test]
fn invalid_formula_does_nothing() {
    let env = env();
    let archive = source_archive();
    let mut formula = formula_for(&archive);
    formula.checksum.push('0');
    let inst = installer(&env, FakeToolchain::new(archive, BANNER));

    let err = inst.install(&formula).unwrap_err();

    assert_eq!(err.stage(), Stage::Formula);
    assert!(inst.toolchain().calls().is_empty());
}

#[test]
fn fetch_alone_rejects_invalid_formula() {
    let env = env();
    let archive = source_archive();
    let mut formula = formula_for(&archive);
    formula.source_url = "ftp://example.invalid/v0.5.0.tar.gz".to_string();
    let inst = installer(&env, FakeToolchain::new(archive, BANNER));

    let err = inst.fetch(&formula).unwrap_err();

    assert_eq!(err.stage(), Stage::Formula);
    assert!(inst.toolchain().calls().is_empty());
}

#[cfg(unix)]
#[test]
fn smoke_test_and_uninstall_after_install() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);
    let inst = installer(&env, FakeToolchain::new(archive, BANNER));

    inst.install(&formula).unwrap();
    assert_eq!(inst.smoke_test(&formula).unwrap(), BANNER);

    assert!(inst.uninstall(&formula).unwrap());
    assert!(!env.bin_dir.join("hydrophone").exists());
    assert!(inst.receipts().read("hydrophone").unwrap().is_none());
    assert!(!inst.uninstall(&formula).unwrap());
}

#[test]
fn smoke_test_without_install_is_an_error() {
    let env = env();
    let inst = installer(&env, FakeToolchain::new(Vec::new(), BANNER));
    let err = inst.smoke_test(&hydrophone()).unwrap_err();
    assert!(matches!(err, InstallError::Io { .. }), "{err:?}");
    assert_eq!(err.stage(), Stage::SmokeTest);
}

#[cfg(unix)]
#[test]
fn failed_reinstall_keeps_previous_install() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);

    let good = installer(&env, FakeToolchain::new(archive.clone(), BANNER));
    let first = good.install(&formula).unwrap();
    let first_bytes = fs::read(&first.binary).unwrap();
    let first_receipt = good.receipts().read("hydrophone").unwrap().unwrap();

    let broken = installer(&env, FakeToolchain::new(archive, "Usage: hydrophone [flags]"));
    let err = broken.install(&formula).unwrap_err();

    assert_eq!(err.stage(), Stage::SmokeTest, "{err:?}");
    assert_eq!(fs::read(&first.binary).unwrap(), first_bytes);
    assert_eq!(
        broken.receipts().read("hydrophone").unwrap(),
        Some(first_receipt)
    );
    assert!(!env.bin_dir.join(".hydrophone.previous").exists());
    assert_eq!(good.smoke_test(&formula).unwrap(), BANNER);
}

#[cfg(unix)]
#[test]
fn uninstall_only_touches_its_own_prefix() {
    let env = env();
    let archive = source_archive();
    let formula = formula_for(&archive);
    let a_bin = env._root.path().join("a").join("bin");
    let b_bin = env._root.path().join("b").join("bin");

    // One receipt directory shared by both prefixes.
    let in_a = Installer::new(
        FakeToolchain::new(archive.clone(), BANNER),
        &a_bin,
        ReceiptStore::new(&env.receipts_dir),
    );
    let in_b = Installer::new(
        FakeToolchain::new(archive, BANNER),
        &b_bin,
        ReceiptStore::new(&env.receipts_dir),
    );
    in_a.install(&formula).unwrap();
    in_b.install(&formula).unwrap();

    assert!(in_a.uninstall(&formula).unwrap());

    assert!(!a_bin.join("hydrophone").exists());
    assert!(b_bin.join("hydrophone").is_file());
    let receipt = in_b.receipts().read("hydrophone").unwrap().unwrap();
    assert_eq!(receipt.binary, b_bin.join("hydrophone"));
}

