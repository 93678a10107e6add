//! Connection Registry
//!
//! Live connections keyed by a [`ClientId`] that is never reused. Keys grow
//! monotonically, so ordered iteration is insertion order and removing one
//! entry never disturbs the keys of the others.

use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Insertion-ordered map from client id to connection state
#[derive(Debug)]
pub struct ConnectionRegistry<T> {
    entries: BTreeMap<ClientId, T>,
    next_id: u64,
}

impl<T> Default for ConnectionRegistry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T> ConnectionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its new id
    pub fn insert(&mut self, value: T) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, value);
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<T> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of live ids in insertion order
    pub fn ids(&self) -> Vec<ClientId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &T)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Remove every entry, yielding them in insertion order
    pub fn drain(&mut self) -> impl Iterator<Item = (ClientId, T)> {
        std::mem::take(&mut self.entries).into_iter()
    }
}
