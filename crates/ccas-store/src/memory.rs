use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, RwLock};

use ccas_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageBackend;

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. Object bytes are held behind a
/// `RwLock` and shared with open readers, so reads never copy.
pub struct InMemoryStorage {
    objects: RwLock<HashMap<ObjectId, Arc<[u8]>>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total stored bytes across all objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|bytes| bytes.len() as u64)
            .sum()
    }

    /// Remove all objects from the store.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
    }

    /// Overwrite an object's stored bytes, bypassing idempotency. Lets
    /// tests simulate corruption at rest.
    pub fn replace_raw(&self, id: &ObjectId, bytes: Vec<u8>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(id.clone(), bytes.into());
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryStorage {
    fn write_stream(&self, id: &ObjectId, data: &mut dyn Read) -> StoreResult<u64> {
        if self.exists(id)? {
            return Ok(0);
        }
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).map_err(StoreError::from_stream)?;
        let len = buf.len() as u64;
        let mut map = self.objects.write().expect("lock poisoned");
        // A concurrent writer may have won the race; keep its bytes.
        if map.contains_key(id) {
            return Ok(0);
        }
        map.insert(id.clone(), buf.into());
        Ok(len)
    }

    fn open(&self, id: &ObjectId) -> StoreResult<Option<Box<dyn Read + Send>>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map
            .get(id)
            .map(|bytes| Box::new(Cursor::new(Arc::clone(bytes))) as Box<dyn Read + Send>))
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    fn list(&self) -> StoreResult<Vec<ObjectId>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryStorage")
            .field("object_count", &count)
            .finish()
    }
}
