//! Built-in formula for the hydrophone conformance test runner.

use std::collections::BTreeSet;

use super::{PackageDescriptor, SmokeTest};

const HYDROPHONE_SHA256: &str = "7108d427906552138881630a77eb8765e080ccbbe491f1aaee87beaf1db58565";

/// Hydrophone v0.5.0, built with `go build -ldflags "-s -w"`.
pub fn hydrophone() -> PackageDescriptor {
    PackageDescriptor {
        name: "hydrophone".to_string(),
        description: "Lightweight Kubernetes conformance tests runner".to_string(),
        homepage: "https://github.com/kubernetes-sigs/hydrophone".to_string(),
        source_url: "https://github.com/kubernetes-sigs/hydrophone/archive/refs/tags/v0.5.0.tar.gz"
            .to_string(),
        checksum: HYDROPHONE_SHA256.to_string(),
        license: "Apache-2.0".to_string(),
        build_dependencies: BTreeSet::from(["go".to_string()]),
        version: None,
        ldflags: vec!["-s".to_string(), "-w".to_string()],
        smoke_test: SmokeTest {
            args: vec!["--help".to_string()],
            expect: "Hydrophone is a lightweight runner for kubernetes tests".to_string(),
        },
    }
}
