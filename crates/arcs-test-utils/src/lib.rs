#![deny(unsafe_code)]

//! Shared test utilities for the arcs workspace.
//!
//! Provides config builders, on-disk manifest fixtures and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! arcs-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod manifest;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use manifest::ManifestDir;
