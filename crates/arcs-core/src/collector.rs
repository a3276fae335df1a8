//! Collector records and the registry they live in.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::{AttributeStore, Attributes, Object};

/// A remote collector that pulls its configuration from arcs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collector {
    id: String,
    name: String,
    attributes: Attributes,
    /// Fingerprint of the content last served to this collector.
    last_known_hash: String,
}

impl Collector {
    /// A freshly registered collector with no known hash.
    pub fn new(id: impl Into<String>, name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attributes,
            last_known_hash: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_known_hash(&self) -> &str {
        &self.last_known_hash
    }

    /// Whether `other` carries the same id, name and attributes.
    /// The last known hash is not part of a registration.
    pub fn same_registration(&self, other: &Collector) -> bool {
        self.id == other.id && self.name == other.name && self.attributes == other.attributes
    }
}

impl Object for Collector {
    fn identity(&self) -> &str {
        &self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("collector id {id:?} is already registered with a different name or attributes")]
    Conflict { id: String },
}

/// Outcome of a successful [`CollectorRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// An identical registration already existed.
    Unchanged,
}

/// Outcome of [`CollectorRegistry::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    Removed,
    NotRegistered,
}

/// Collectors indexed by id and attributes.
#[derive(Default)]
pub struct CollectorRegistry {
    store: AttributeStore<Collector>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector.
    ///
    /// Re-registering with identical id, name and attributes is a no-op.
    /// Any difference is a conflict and the stored entry is left untouched.
    pub fn register(
        &self,
        id: &str,
        name: &str,
        attributes: Attributes,
    ) -> Result<Registration, RegistryError> {
        let candidate = Collector::new(id, name, attributes);
        match self.store.try_insert(candidate.clone()) {
            Ok(_) => {
                info!(id, name, "collector registered");
                Ok(Registration::Created)
            }
            Err(existing) if existing.same_registration(&candidate) => {
                debug!(id, "collector re-registered with identical details");
                Ok(Registration::Unchanged)
            }
            Err(_) => {
                warn!(id, name, "collector registration conflicts with existing entry");
                Err(RegistryError::Conflict { id: id.to_string() })
            }
        }
    }

    /// Remove a collector. Absence is not an error.
    pub fn unregister(&self, id: &str) -> Unregistration {
        if self.store.remove(id) {
            info!(id, "collector unregistered");
            Unregistration::Removed
        } else {
            debug!(id, "unregister requested for unknown collector");
            Unregistration::NotRegistered
        }
    }

    pub fn get(&self, id: &str) -> Option<Collector> {
        self.store.get(id)
    }

    pub fn list(&self) -> Vec<Collector> {
        self.store.list()
    }

    /// Collectors sharing at least one attribute pair with `query`.
    pub fn get_by_attributes(&self, query: &Attributes) -> Vec<Collector> {
        self.store.get_by_attributes(query)
    }

    /// Record the fingerprint last served to `id`. Returns `false` if the
    /// collector is no longer registered.
    pub fn set_last_known_hash(&self, id: &str, hash: &str) -> bool {
        self.store.update(id, |collector| {
            collector.last_known_hash = hash.to_string();
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
