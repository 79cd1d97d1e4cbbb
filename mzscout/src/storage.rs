use crate::errors::StorageError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Keyed store with exclusive ownership of its records.
///
/// The store never hands out live mutable references: `get` returns a
/// clone, and updates go through whole-value replacement with `modify`
/// (checkout / mutate / checkin). Every operation either fully succeeds
/// or leaves the store untouched.
///
/// Backed by a `BTreeMap` so iteration order is deterministic, which
/// keeps downstream output (and tests) stable.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Repository<K: Ord, V> {
    entries: BTreeMap<K, V>,
}

impl<K, V> Repository<K, V>
where
    K: Ord + Display,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Store a new record. Fails if the key is already present; the
    /// stored value is never silently overwritten.
    pub fn add(&mut self, key: K, value: V) -> Result<(), StorageError> {
        if self.entries.contains_key(&key) {
            return Err(StorageError::KeyAlreadyPresent {
                key: key.to_string(),
            });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Check out a clone of the stored record. Fails if the key is absent.
    pub fn get(&self, key: &K) -> Result<V, StorageError> {
        match self.entries.get(key) {
            Some(v) => Ok(v.clone()),
            None => Err(StorageError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Check in a record, replacing the stored value atomically. Fails if
    /// the key is absent, in which case nothing is written.
    pub fn modify(&mut self, key: K, value: V) -> Result<(), StorageError> {
        match self.entries.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StorageError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}
