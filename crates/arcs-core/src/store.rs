//! Attribute-indexed object store.
//!
//! [`AttributeStore`] keeps a primary map from identity to object and a
//! secondary index from `(attribute key, attribute value)` to the identities
//! tagged with that pair. The config catalogue and the collector registry are
//! both built on it.
//!
//! One [`RwLock`] guards the map and the index together. Readers share it,
//! writers are serialized, and no guard ever escapes a method: lookups hand
//! out clones.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

/// Key/value attributes attached to stored objects and to queries.
pub type Attributes = BTreeMap<String, String>;

/// Anything that can live in an [`AttributeStore`].
pub trait Object: Clone + Send + Sync + 'static {
    /// Unique, immutable identity.
    fn identity(&self) -> &str;

    /// Attributes the object is indexed under.
    fn attributes(&self) -> &Attributes;
}

type AttributeIndex = HashMap<String, HashMap<String, HashSet<String>>>;

struct Inner<T> {
    objects: HashMap<String, T>,
    index: AttributeIndex,
}

impl<T: Object> Inner<T> {
    /// Store `object`, dropping the index entries of whatever it displaces.
    fn insert(&mut self, object: T) -> (String, Option<T>) {
        let id = object.identity().to_string();
        let previous = self.objects.remove(&id);
        if let Some(previous) = &previous {
            self.unindex(&id, previous.attributes());
        }
        for (key, value) in object.attributes() {
            self.index
                .entry(key.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(id.clone());
        }
        self.objects.insert(id.clone(), object);
        (id, previous)
    }

    fn unindex(&mut self, id: &str, attributes: &Attributes) {
        for (key, value) in attributes {
            let Some(values) = self.index.get_mut(key) else {
                continue;
            };
            if let Some(ids) = values.get_mut(value) {
                ids.remove(id);
                if ids.is_empty() {
                    values.remove(value);
                }
            }
            if values.is_empty() {
                self.index.remove(key);
            }
        }
    }
}

/// Concurrent store of `T` with a secondary attribute index.
pub struct AttributeStore<T> {
    inner: RwLock<Inner<T>>,
}

impl<T: Object> AttributeStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                objects: HashMap::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Insert or overwrite `object` under its identity and return that identity.
    ///
    /// An object already stored under the same identity is unindexed first, so
    /// its attributes stop matching even when the new set differs.
    pub fn put(&self, object: T) -> String {
        self.inner.write().insert(object).0
    }

    /// Like [`put`](Self::put), but hands back the object that was displaced.
    ///
    /// Unindexing the old object and indexing the new one happen under one
    /// write lock, so concurrent replacements of the same identity cannot
    /// interleave.
    pub fn replace(&self, object: T) -> Option<T> {
        self.inner.write().insert(object).1
    }

    /// [`put`](Self::put) every object under a single write lock.
    ///
    /// Returns the number of objects written. Later objects overwrite earlier
    /// ones with the same identity.
    pub fn put_all(&self, objects: impl IntoIterator<Item = T>) -> usize {
        let mut inner = self.inner.write();
        objects.into_iter().map(|o| inner.insert(o)).count()
    }

    /// Insert `object` only if its identity is free.
    ///
    /// The check and the insert happen under one write lock. On collision the
    /// stored object is returned unchanged.
    pub fn try_insert(&self, object: T) -> Result<String, T> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.objects.get(object.identity()) {
            return Err(existing.clone());
        }
        Ok(inner.insert(object).0)
    }

    /// Point lookup.
    pub fn get(&self, id: &str) -> Option<T> {
        self.inner.read().objects.get(id).cloned()
    }

    /// Whether an object with this identity is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().objects.contains_key(id)
    }

    /// Remove the object and every index entry pointing at it.
    ///
    /// Empty value buckets and empty key buckets are pruned. Returns `false`
    /// when nothing was stored under `id`.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(object) = inner.objects.remove(id) else {
            return false;
        };
        inner.unindex(id, object.attributes());
        true
    }

    /// Apply `update` to the stored object in place.
    ///
    /// `update` must leave identity and attributes untouched; the index is not
    /// rebuilt. Returns `false` when nothing was stored under `id`.
    pub fn update(&self, id: &str, update: impl FnOnce(&mut T)) -> bool {
        let mut inner = self.inner.write();
        let Some(object) = inner.objects.get_mut(id) else {
            return false;
        };
        update(object);
        debug_assert_eq!(object.identity(), id, "update changed an identity");
        true
    }

    /// Every stored object, in no particular order.
    pub fn list(&self) -> Vec<T> {
        self.inner.read().objects.values().cloned().collect()
    }

    /// Objects sharing at least one `(key, value)` pair with `query`.
    ///
    /// This is a union over the query pairs, not an intersection: `{a=1, b=2}`
    /// matches an object tagged only `a=1`. Each object appears once.
    pub fn get_by_attributes(&self, query: &Attributes) -> Vec<T> {
        let inner = self.inner.read();
        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for (key, value) in query {
            let Some(ids) = inner.index.get(key).and_then(|values| values.get(value)) else {
                continue;
            };
            for id in ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                if let Some(object) = inner.objects.get(id) {
                    matched.push(object.clone());
                }
            }
        }
        matched
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn index_snapshot(&self) -> AttributeIndex {
        self.inner.read().index.clone()
    }
}

impl<T: Object> Default for AttributeStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
