//! Config source descriptors.
//!
//! A [`ConfigSource`] is parsed from a `protocol://path` string plus its
//! attributes. Its identity is the fingerprint of the literal source string,
//! so registering the same string twice lands on the same store entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprint;
use crate::store::{Attributes, Object};

/// Separator between protocol and path in a source string.
pub const PROTOCOL_DELIMITER: &str = "://";

/// Errors from parsing a source string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source {0:?} is malformed, expected [protocol]://[path]")]
    Malformed(String),

    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),
}

/// Protocols a source may be fetched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    File,
    Http,
    Https,
    /// Accepted but not fetched: resolves to empty content.
    Ftp,
}

impl Protocol {
    /// Every protocol accepted at construction time.
    pub const ALL: [Protocol; 4] = [
        Protocol::File,
        Protocol::Http,
        Protocol::Https,
        Protocol::Ftp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::File => "file",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ftp => "ftp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SourceError::UnknownProtocol(s.to_string()))
    }
}

/// A retrievable piece of configuration and the attributes it is served for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    id: String,
    protocol: Protocol,
    path: String,
    attributes: Attributes,
}

impl ConfigSource {
    /// Parse `source` (`protocol://path`) and attach `attributes`.
    ///
    /// Splits on the first `://`. The protocol is checked here, so a source
    /// that constructs successfully always has a known protocol.
    pub fn new(source: &str, attributes: Attributes) -> Result<Self, SourceError> {
        let (protocol, path) = source
            .split_once(PROTOCOL_DELIMITER)
            .ok_or_else(|| SourceError::Malformed(source.to_string()))?;
        let protocol = protocol.parse()?;

        Ok(Self {
            id: fingerprint(source),
            protocol,
            path: path.to_string(),
            attributes,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The `protocol://path` string this source was built from.
    pub fn source(&self) -> String {
        format!("{}{PROTOCOL_DELIMITER}{}", self.protocol, self.path)
    }
}

impl Object for ConfigSource {
    fn identity(&self) -> &str {
        &self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}
