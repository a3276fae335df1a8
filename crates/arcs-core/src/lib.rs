#![deny(unsafe_code)]

//! arcs core runtime.
//!
//! Serves configuration to remote telemetry collectors. Config sources
//! (`file://`, `http://`, ...) and collectors are both tagged with
//! attributes; a collector's config is the concatenated content of every
//! source sharing at least one attribute pair with its request, fingerprinted
//! so unchanged content can be reported as not modified.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future for trait methods that must stay
/// object-safe (`dyn Fetch`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// HTTP/JSON binding: axum router, shared types, and a typed client.
pub mod api;
/// Collector records and registry.
pub mod collector;
/// Fetching source content over file and http(s).
pub mod content;
/// Cancellable fan-out of sibling tasks.
pub mod fanout;
/// FNV-1 content fingerprints.
pub mod fingerprint;
/// Manifest discovery and parsing.
pub mod manifest;
/// Per-collector config resolution.
pub mod resolver;
/// Server runtime: bootstrap, listen, shutdown.
pub mod server;
/// Config source identities.
pub mod source;
/// Attribute-indexed object store.
pub mod store;

pub use api::ArcsClient;
pub use collector::{Collector, CollectorRegistry};
pub use content::{ContentResolver, Fetch};
pub use fingerprint::fingerprint;
pub use resolver::{ConfigRequest, ConfigResolver, ConfigStore, ResolvedConfig};
pub use server::Server;
pub use source::{ConfigSource, Protocol};
pub use store::{AttributeStore, Attributes, Object};
