//! Access key storage shared between the request layer and the console.

use parking_lot::RwLock;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Shared handle to the engine access key. Clones share the same slot.
///
/// The key is wiped from memory when replaced or cleared.
#[derive(Clone, Default)]
pub struct CredentialStore {
    key: Arc<RwLock<Option<Zeroizing<String>>>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl CredentialStore {
    /// Store seeded with `key`; empty keys count as absent.
    pub fn new(key: Option<String>) -> Self {
        let store = Self::default();
        if let Some(key) = key {
            store.set(key);
        }
        store
    }

    /// Replace the key. An empty key is ignored.
    pub fn set(&self, key: impl Into<String>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        *self.key.write() = Some(Zeroizing::new(key));
    }

    pub fn clear(&self) {
        self.key.write().take();
    }

    pub fn is_authenticated(&self) -> bool {
        self.key.read().is_some()
    }

    /// Copy of the current key, for attaching to a request.
    pub fn header_value(&self) -> Option<Zeroizing<String>> {
        self.key.read().clone()
    }
}
