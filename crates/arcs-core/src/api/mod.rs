//! HTTP/JSON binding of the arcs operations.
//!
//! The server exposes configs and collectors as plain JSON resources over
//! TCP. Collectors fetch their configuration with
//! `POST /collectors/{id}/config`; operators and the CLI use the rest.
//!
//! ```text
//! ┌────────────┐                           ┌──────────────┐
//! │ collectors │──── HTTP/1.1 + JSON ─────▶│  api server  │
//! │  arcs CLI  │                           │   (axum)     │
//! └────────────┘                           └──────┬───────┘
//!                                                 │
//!                                   ┌─────────────▼─────────────┐
//!                                   │ ConfigResolver / stores   │
//!                                   └───────────────────────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{ArcsClient, ClientError};
pub use server::{AppState, ServiceError, router, serve};
pub use types::*;
