//! Fuzz target for manifest parsing.
//!
//! Run with: cargo +nightly fuzz run fuzz_manifest_parser
//!
//! Feeds arbitrary bytes to `parse_manifest`. Every accepted source must have
//! an identity equal to the fingerprint of its source string.

#![no_main]

use std::path::Path;

use arcs_core::manifest::parse_manifest;
use arcs_core::{Object, fingerprint};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(loaded) = parse_manifest(Path::new("fuzz.yaml"), data) {
        for source in &loaded.sources {
            assert_eq!(source.identity(), fingerprint(source.source()));
        }
    }
});
