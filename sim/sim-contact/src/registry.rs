//! Registry of the contacts a body currently takes part in.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use sim_types::{BodyId, PairKey, Result, SimError};
use tracing::debug;

use crate::SharedContact;

/// Thread-safe map from body pair to the contact between them.
///
/// Every operation takes the lock and releases it before returning, so
/// concurrent attaches and detaches from collision threads are serialized
/// per registry. Each body owns one registry; a contact appears in the
/// registries of both of its bodies.
#[derive(Debug, Default)]
pub struct ContactRegistry {
    contacts: Mutex<HashMap<PairKey, SharedContact>>,
}

impl ContactRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a contact under its pair key.
    ///
    /// Fails with [`SimError::DuplicateContact`] if the pair is already present.
    pub fn attach(&self, contact: &SharedContact) -> Result<()> {
        let key = contact.read().key();
        let mut contacts = self.contacts.lock();
        if contacts.contains_key(&key) {
            return Err(SimError::DuplicateContact {
                low: key.low().raw(),
                high: key.high().raw(),
            });
        }
        contacts.insert(key, Arc::clone(contact));
        debug!(pair = %key, count = contacts.len(), "Attached contact");
        Ok(())
    }

    /// Remove and return the contact between `a` and `b`.
    ///
    /// Fails with [`SimError::MissingContact`] if there is none.
    pub fn detach(&self, a: BodyId, b: BodyId) -> Result<SharedContact> {
        let key = PairKey::new(a, b);
        let mut contacts = self.contacts.lock();
        let removed = contacts.remove(&key).ok_or(SimError::MissingContact {
            low: key.low().raw(),
            high: key.high().raw(),
        })?;
        debug!(pair = %key, count = contacts.len(), "Detached contact");
        Ok(removed)
    }

    /// Contact between `a` and `b`, in either order.
    #[must_use]
    pub fn find(&self, a: BodyId, b: BodyId) -> Option<SharedContact> {
        self.contacts.lock().get(&PairKey::new(a, b)).cloned()
    }

    /// Whether a contact between `a` and `b` is registered.
    #[must_use]
    pub fn contains(&self, a: BodyId, b: BodyId) -> bool {
        self.contacts.lock().contains_key(&PairKey::new(a, b))
    }

    /// Number of registered contacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.lock().len()
    }

    /// Whether no contact is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.lock().is_empty()
    }

    /// Sorted snapshot of the registered keys.
    #[must_use]
    pub fn keys(&self) -> Vec<PairKey> {
        let mut keys: Vec<_> = self.contacts.lock().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Handles to every registered contact, ordered by key.
    #[must_use]
    pub fn contacts(&self) -> Vec<SharedContact> {
        let contacts = self.contacts.lock();
        let mut entries: Vec<_> = contacts.iter().collect();
        entries.sort_unstable_by_key(|(key, _)| **key);
        entries.into_iter().map(|(_, c)| Arc::clone(c)).collect()
    }
}
