//! Fuzz target for `AppConfig::parse`.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(config) = arcs_config::AppConfig::parse(s)
    {
        // Anything that parses has already passed validation.
        assert_ne!(config.server.listen_port, 0);
        assert!(!config.manifests.path.is_empty());
    }
});
