use std::collections::HashMap;
use std::sync::RwLock;

use ccas_crypto::EncryptionKey;
use ccas_types::ObjectId;

use crate::error::StoreResult;

/// Maps encrypted object IDs to the key a reader needs.
///
/// The formatter derives each key from content and forgets it; whatever
/// implements this trait is how the surrounding system hands it back at
/// read time.
pub trait KeyIndex: Send + Sync {
    /// Remember the key for `id`. Recording the same pair twice is a no-op.
    fn record(&self, id: &ObjectId, key: &EncryptionKey) -> StoreResult<()>;

    /// The key for `id`, if known.
    fn lookup(&self, id: &ObjectId) -> StoreResult<Option<EncryptionKey>>;

    /// Drop the key for `id`. Returns `true` if one was known.
    fn forget(&self, id: &ObjectId) -> StoreResult<bool>;
}

/// Process-local key index. Keys live only as long as the index.
#[derive(Default)]
pub struct InMemoryKeyIndex {
    keys: RwLock<HashMap<ObjectId, EncryptionKey>>,
}

impl InMemoryKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyIndex for InMemoryKeyIndex {
    fn record(&self, id: &ObjectId, key: &EncryptionKey) -> StoreResult<()> {
        let mut map = self.keys.write().expect("lock poisoned");
        map.entry(id.clone()).or_insert_with(|| key.clone());
        Ok(())
    }

    fn lookup(&self, id: &ObjectId) -> StoreResult<Option<EncryptionKey>> {
        let map = self.keys.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn forget(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.keys.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }
}

impl std::fmt::Debug for InMemoryKeyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyIndex")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::encrypted("", &[byte; 32])
    }

    #[test]
    fn record_and_lookup() {
        let index = InMemoryKeyIndex::new();
        let key = EncryptionKey::from_bytes([1; 32]);
        index.record(&id(1), &key).unwrap();
        assert_eq!(index.lookup(&id(1)).unwrap(), Some(key));
        assert_eq!(index.lookup(&id(2)).unwrap(), None);
    }

    #[test]
    fn record_is_idempotent() {
        let index = InMemoryKeyIndex::new();
        let key = EncryptionKey::from_bytes([1; 32]);
        index.record(&id(1), &key).unwrap();
        index.record(&id(1), &key).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn forget_removes() {
        let index = InMemoryKeyIndex::new();
        index.record(&id(1), &EncryptionKey::from_bytes([1; 32])).unwrap();
        assert!(index.forget(&id(1)).unwrap());
        assert!(!index.forget(&id(1)).unwrap());
        assert!(index.is_empty());
    }

    #[test]
    fn debug_hides_keys() {
        let index = InMemoryKeyIndex::new();
        index.record(&id(1), &EncryptionKey::from_bytes([0xee; 32])).unwrap();
        let debug = format!("{index:?}");
        assert!(debug.contains("key_count: 1"));
        assert!(!debug.contains("ee"));
    }
}
