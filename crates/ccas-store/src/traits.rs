use std::io::Read;

use ccas_types::ObjectId;

use crate::error::StoreResult;

/// Physical storage for `(ObjectId, bytes)` pairs.
///
/// Backends receive bytes that have already been through the write
/// transform and replay them verbatim; they know nothing about hashing,
/// keys, or encryption.
///
/// All implementations must satisfy these invariants:
/// - Writes are idempotent: writing an ID that already exists keeps the
///   existing bytes.
/// - A partially written object is never visible under its ID.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait StorageBackend: Send + Sync {
    /// Persist everything `data` yields under `id`. Returns the number of
    /// bytes stored (0 if the object already existed).
    fn write_stream(&self, id: &ObjectId, data: &mut dyn Read) -> StoreResult<u64>;

    /// Open an object's stored bytes. Returns `Ok(None)` if it does not exist.
    fn open(&self, id: &ObjectId) -> StoreResult<Option<Box<dyn Read + Send>>>;

    /// Check whether an object exists.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete an object by ID. Returns `true` if the object existed.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// All stored IDs, sorted.
    fn list(&self) -> StoreResult<Vec<ObjectId>>;

    /// Read an object's stored bytes in full.
    ///
    /// Default implementation drains [`StorageBackend::open`].
    fn read_all(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let Some(mut reader) = self.open(id)? else {
            return Ok(None);
        };
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }
}
