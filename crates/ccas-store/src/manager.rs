use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use ccas_crypto::EncryptionKey;
use ccas_types::ObjectId;
use tracing::{debug, warn};

use crate::config::FormatConfig;
use crate::error::{StoreError, StoreResult};
use crate::formatter::{ObjectFormatter, ObjectReader, ReadTransform, StreamTransform};
use crate::keys::{InMemoryKeyIndex, KeyIndex};
use crate::stats::ObjectManagerStats;
use crate::traits::StorageBackend;

/// Result of [`ObjectManager::write_object`].
#[derive(Clone, Debug)]
pub struct WrittenObject {
    pub id: ObjectId,
    /// Key needed to read the object back; `None` for plain objects.
    pub key: Option<EncryptionKey>,
    /// The ID already existed, so nothing was written.
    pub deduplicated: bool,
    /// Bytes handed to the backend (0 when deduplicated).
    pub stored_bytes: u64,
}

/// Boxed stream returned by [`ObjectManager::open_object`].
pub type ObjectStream = ObjectReader<Box<dyn Read + Send>>;

/// Writes and reads objects through a formatter, a storage backend, and a
/// key index.
///
/// Writes are deduplicated on ID: the formatter derives the ID first, and
/// the write transform only runs if the backend does not have it yet.
pub struct ObjectManager {
    formatter: Box<dyn ObjectFormatter>,
    storage: Arc<dyn StorageBackend>,
    keys: Arc<dyn KeyIndex>,
    stats: Arc<ObjectManagerStats>,
}

impl ObjectManager {
    /// Manager with a fresh in-memory key index and fresh counters.
    pub fn new(formatter: Box<dyn ObjectFormatter>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            formatter,
            storage,
            keys: Arc::new(InMemoryKeyIndex::new()),
            stats: Arc::new(ObjectManagerStats::new()),
        }
    }

    /// Manager using the formatter `config` selects.
    pub fn from_config(config: &FormatConfig, storage: Arc<dyn StorageBackend>) -> StoreResult<Self> {
        Ok(Self::new(config.build_formatter()?, storage))
    }

    /// Use a shared key index instead of the private in-memory one.
    pub fn with_key_index(mut self, keys: Arc<dyn KeyIndex>) -> Self {
        self.keys = keys;
        self
    }

    /// Report into shared counters instead of private ones.
    pub fn with_stats(mut self, stats: Arc<ObjectManagerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<ObjectManagerStats> {
        &self.stats
    }

    pub fn formatter_name(&self) -> &'static str {
        self.formatter.name()
    }

    /// The ID `data` would be stored under, without writing anything.
    pub fn compute_id(&self, data: &[u8], prefix: &str) -> ObjectId {
        self.formatter.format(data, prefix, &self.stats).0
    }

    /// Like [`ObjectManager::compute_id`], digesting `reader` to its end in
    /// bounded memory.
    pub fn compute_id_reader(&self, reader: &mut dyn Read, prefix: &str) -> StoreResult<ObjectId> {
        Ok(self.formatter.format_reader(reader, prefix, &self.stats)?.0)
    }

    /// Store `data` under `prefix`, skipping the write if the ID exists.
    pub fn write_object(&self, data: &[u8], prefix: &str) -> StoreResult<WrittenObject> {
        let (id, transform) = self.formatter.format(data, prefix, &self.stats);
        self.commit(id, transform, data.len() as u64, data)
    }

    /// Store everything from the current position of `source` to its end.
    ///
    /// The source is read twice: once to derive the ID and once, after
    /// seeking back, to write it. Neither pass buffers the whole object.
    /// The second pass is capped at the length seen by the first, so the
    /// source must not change in between.
    pub fn write_seekable<R: Read + Seek>(&self, mut source: R, prefix: &str) -> StoreResult<WrittenObject> {
        let start = source.stream_position()?;
        let (id, transform) = self.formatter.format_reader(&mut source, prefix, &self.stats)?;
        let size = source.stream_position()? - start;
        source.seek(SeekFrom::Start(start))?;
        self.commit(id, transform, size, source.take(size))
    }

    fn commit<R: Read>(
        &self,
        id: ObjectId,
        transform: StreamTransform,
        size: u64,
        source: R,
    ) -> StoreResult<WrittenObject> {
        let key = transform.encryption_key().cloned();
        if let Some(key) = &key {
            self.keys.record(&id, key)?;
        }

        if self.storage.exists(&id)? {
            self.stats.record_present();
            debug!(id = %id, size, "object already present, skipping write");
            return Ok(WrittenObject {
                id,
                key,
                deduplicated: true,
                stored_bytes: 0,
            });
        }

        let mut reader = transform.apply(source)?;
        let stored_bytes = self.storage.write_stream(&id, &mut reader)?;
        self.stats.record_written(stored_bytes);
        debug!(id = %id, size, stored_bytes, "object written");

        Ok(WrittenObject {
            id,
            key,
            deduplicated: false,
            stored_bytes,
        })
    }

    /// Open an object for streaming plaintext reads, looking up its key in
    /// the key index when it is encrypted.
    pub fn open_object(&self, id: &ObjectId) -> StoreResult<ObjectStream> {
        let key = if id.is_encrypted() {
            self.keys.lookup(id)?
        } else {
            None
        };
        self.open_object_with_key(id, key)
    }

    /// Open an object with a caller-supplied key.
    pub fn open_object_with_key(
        &self,
        id: &ObjectId,
        key: Option<EncryptionKey>,
    ) -> StoreResult<ObjectStream> {
        let transform = ReadTransform::for_object(id, key)?;
        let stored = self
            .storage
            .open(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(transform.apply(stored))
    }

    /// Read an object's full plaintext. Nothing is returned unless every
    /// byte passed authentication.
    pub fn read_object(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let reader = self.open_object(id)?;
        self.drain(id, reader)
    }

    /// Read an object's full plaintext with a caller-supplied key.
    pub fn read_object_with_key(
        &self,
        id: &ObjectId,
        key: Option<EncryptionKey>,
    ) -> StoreResult<Vec<u8>> {
        let reader = self.open_object_with_key(id, key)?;
        self.drain(id, reader)
    }

    fn drain(&self, id: &ObjectId, mut reader: ObjectStream) -> StoreResult<Vec<u8>> {
        let mut data = Vec::new();
        if let Err(e) = reader.read_to_end(&mut data) {
            let err = StoreError::from_stream(e);
            if err.is_integrity() {
                self.stats.record_invalid();
                warn!(id = %id, "stored object failed integrity check");
            }
            return Err(err);
        }
        self.stats.record_read(data.len() as u64);
        Ok(data)
    }

    /// Read an object back and check that its content still derives the
    /// same ID under this manager's formatter. Objects of the other kind
    /// (encrypted vs. plain) are rejected up front without being counted
    /// invalid.
    pub fn verify_object(&self, id: &ObjectId) -> StoreResult<()> {
        if id.is_encrypted() != self.formatter.is_encrypting() {
            return Err(StoreError::FormatterMismatch {
                id: id.clone(),
                formatter: self.formatter.name(),
            });
        }
        let data = self.read_object(id)?;
        let computed = self.compute_id(&data, id.prefix());
        if computed != *id {
            self.stats.record_invalid();
            warn!(id = %id, computed = %computed, "object content does not match its id");
            return Err(StoreError::HashMismatch {
                id: id.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Delete an object and forget its key.
    pub fn delete_object(&self, id: &ObjectId) -> StoreResult<bool> {
        if id.is_encrypted() {
            self.keys.forget(id)?;
        }
        self.storage.delete(id)
    }

    /// All object IDs the backend holds.
    pub fn list_objects(&self) -> StoreResult<Vec<ObjectId>> {
        self.storage.list()
    }
}

impl std::fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectManager")
            .field("formatter", &self.formatter.name())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{EncryptingFormatter, PlainFormatter};
    use crate::memory::InMemoryStorage;
    use ccas_crypto::{encrypted_len, ContentHasher, HashAlgorithm, MasterContentSecret};
    use std::thread;

    fn encrypted_manager() -> (ObjectManager, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let formatter =
            EncryptingFormatter::new(&MasterContentSecret::from_bytes([0x5e; 32])).unwrap();
        let manager = ObjectManager::new(Box::new(formatter), storage.clone());
        (manager, storage)
    }

    fn plain_manager() -> (ObjectManager, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let formatter = PlainFormatter::new(ContentHasher::new(HashAlgorithm::Sha256));
        let manager = ObjectManager::new(Box::new(formatter), storage.clone());
        (manager, storage)
    }

    // -----------------------------------------------------------------------
    // Write / read
    // -----------------------------------------------------------------------

    #[test]
    fn encrypted_write_and_read() {
        let (manager, storage) = encrypted_manager();
        let written = manager.write_object(b"hello world", "").unwrap();
        assert!(written.id.is_encrypted());
        assert!(written.key.is_some());
        assert!(!written.deduplicated);
        assert_eq!(written.stored_bytes, encrypted_len(11));

        let stored = storage.read_all(&written.id).unwrap().unwrap();
        assert!(!stored.windows(11).any(|w| w == b"hello world"));

        assert_eq!(manager.read_object(&written.id).unwrap(), b"hello world");
    }

    #[test]
    fn plain_objects_are_stored_verbatim() {
        let (manager, storage) = plain_manager();
        let written = manager.write_object(b"visible", "p").unwrap();
        assert!(written.key.is_none());
        assert_eq!(written.id.prefix(), "p");
        assert_eq!(storage.read_all(&written.id).unwrap().unwrap(), b"visible");
        assert_eq!(manager.read_object(&written.id).unwrap(), b"visible");
    }

    #[test]
    fn duplicate_writes_are_skipped() {
        let (manager, storage) = encrypted_manager();
        let first = manager.write_object(b"dedup me", "").unwrap();
        let before = storage.read_all(&first.id).unwrap();
        let second = manager.write_object(b"dedup me", "").unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.deduplicated);
        assert_eq!(second.stored_bytes, 0);
        assert_eq!(storage.len(), 1);
        // The transform never ran, so the stored ciphertext is untouched.
        assert_eq!(storage.read_all(&first.id).unwrap(), before);

        let snap = manager.stats().snapshot();
        assert_eq!(snap.written_objects, 1);
        assert_eq!(snap.present_objects, 1);
        assert_eq!(snap.hashed_bytes, 16);
    }

    #[test]
    fn compute_id_matches_write() {
        let (manager, storage) = encrypted_manager();
        let id = manager.compute_id(b"abc", "x");
        assert!(storage.is_empty());
        assert_eq!(manager.write_object(b"abc", "x").unwrap().id, id);
    }

    #[test]
    fn seekable_write_matches_buffered_write() {
        let data: Vec<u8> = (0..150_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let (manager, storage) = encrypted_manager();
        let buffered_id = manager.compute_id(&data, "f");

        // Leading bytes before the start position are not part of the object.
        let mut framed = b"header".to_vec();
        framed.extend_from_slice(&data);
        let mut source = std::io::Cursor::new(framed);
        source.seek(SeekFrom::Start(6)).unwrap();

        let written = manager.write_seekable(source, "f").unwrap();
        assert_eq!(written.id, buffered_id);
        assert!(!written.deduplicated);
        assert_eq!(written.stored_bytes, encrypted_len(data.len() as u64));
        assert_eq!(storage.len(), 1);
        assert_eq!(manager.read_object(&written.id).unwrap(), data);

        let again = manager.write_seekable(std::io::Cursor::new(data.as_slice()), "f").unwrap();
        assert!(again.deduplicated);
    }

    #[test]
    fn streamed_id_matches_buffered_id() {
        let (manager, _) = plain_manager();
        let mut reader: &[u8] = b"streamed";
        assert_eq!(
            manager.compute_id_reader(&mut reader, "q").unwrap(),
            manager.compute_id(b"streamed", "q")
        );
    }

    #[test]
    fn large_object_roundtrip() {
        let (manager, _) = encrypted_manager();
        let data: Vec<u8> = (0..2_500_000u32).map(|i| (i % 241) as u8).collect();
        let written = manager.write_object(&data, "").unwrap();
        assert_eq!(written.stored_bytes, encrypted_len(data.len() as u64));
        assert_eq!(manager.read_object(&written.id).unwrap(), data);
    }

    #[test]
    fn streaming_open_yields_plaintext() {
        let (manager, _) = encrypted_manager();
        let written = manager.write_object(b"streamed", "").unwrap();
        let mut reader = manager.open_object(&written.id).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "streamed");
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_key_index_cannot_read() {
        let (manager, storage) = encrypted_manager();
        let written = manager.write_object(b"secret", "").unwrap();

        let other = ObjectManager::new(
            Box::new(EncryptingFormatter::new(&MasterContentSecret::from_bytes([0x5e; 32])).unwrap()),
            storage,
        );
        assert!(matches!(
            other.read_object(&written.id),
            Err(StoreError::MissingKey(_))
        ));
        assert_eq!(
            other.read_object_with_key(&written.id, written.key).unwrap(),
            b"secret"
        );
    }

    #[test]
    fn shared_key_index_is_used() {
        let keys: Arc<dyn KeyIndex> = Arc::new(InMemoryKeyIndex::new());
        let (manager, storage) = encrypted_manager();
        let manager = manager.with_key_index(keys.clone());
        let written = manager.write_object(b"indexed", "").unwrap();
        assert!(keys.lookup(&written.id).unwrap().is_some());

        let reader = ObjectManager::new(Box::new(PlainFormatter::new(ContentHasher::new(
            HashAlgorithm::Blake3,
        ))), storage)
        .with_key_index(keys);
        assert_eq!(reader.read_object(&written.id).unwrap(), b"indexed");
    }

    #[test]
    fn delete_forgets_key() {
        let keys: Arc<dyn KeyIndex> = Arc::new(InMemoryKeyIndex::new());
        let (manager, _) = encrypted_manager();
        let manager = manager.with_key_index(keys.clone());
        let written = manager.write_object(b"short-lived", "").unwrap();
        assert!(manager.delete_object(&written.id).unwrap());
        assert!(keys.lookup(&written.id).unwrap().is_none());
        assert!(manager.list_objects().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    #[test]
    fn tampered_object_is_an_integrity_error() {
        let (manager, storage) = encrypted_manager();
        let written = manager.write_object(b"do not touch", "").unwrap();
        let mut bytes = storage.read_all(&written.id).unwrap().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        storage.replace_raw(&written.id, bytes);

        let err = manager.read_object(&written.id).unwrap_err();
        assert!(err.is_integrity(), "unexpected error: {err}");
        assert!(!matches!(err, StoreError::Io(_)));
        assert_eq!(manager.stats().snapshot().invalid_objects, 1);
        assert_eq!(manager.stats().snapshot().read_objects, 0);
    }

    #[test]
    fn verify_detects_swapped_plain_content() {
        let (manager, storage) = plain_manager();
        let written = manager.write_object(b"original", "").unwrap();
        manager.verify_object(&written.id).unwrap();

        storage.replace_raw(&written.id, b"replaced".to_vec());
        assert!(matches!(
            manager.verify_object(&written.id),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn verify_encrypted_object() {
        let (manager, _) = encrypted_manager();
        let written = manager.write_object(b"check me", "pre").unwrap();
        manager.verify_object(&written.id).unwrap();
    }

    #[test]
    fn verify_with_other_formatter_kind_is_not_invalid() {
        let keys: Arc<dyn KeyIndex> = Arc::new(InMemoryKeyIndex::new());
        let (writer, storage) = encrypted_manager();
        let writer = writer.with_key_index(keys.clone());
        let written = writer.write_object(b"intact", "").unwrap();

        let plain = ObjectManager::new(
            Box::new(PlainFormatter::new(ContentHasher::new(HashAlgorithm::Blake3))),
            storage,
        )
        .with_key_index(keys);
        assert_eq!(plain.read_object(&written.id).unwrap(), b"intact");

        let err = plain.verify_object(&written.id).unwrap_err();
        assert!(matches!(err, StoreError::FormatterMismatch { formatter: "blake3", .. }));
        assert!(!err.is_integrity());
        assert_eq!(plain.stats().snapshot().invalid_objects, 0);

        // The reverse direction is rejected the same way.
        let plain_id = plain.write_object(b"visible", "").unwrap().id;
        assert!(matches!(
            writer.verify_object(&plain_id),
            Err(StoreError::FormatterMismatch { .. })
        ));
        assert_eq!(writer.stats().snapshot().invalid_objects, 0);
    }

    #[test]
    fn missing_object_is_not_found() {
        let (manager, _) = plain_manager();
        let id = ObjectId::plain("", &[0; 32]);
        assert!(matches!(manager.read_object(&id), Err(StoreError::NotFound(_))));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writers_share_counters() {
        let (manager, storage) = encrypted_manager();
        let manager = Arc::new(manager);
        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let mut total = 0u64;
                    for i in 0..50u8 {
                        // Half the payloads collide across threads.
                        let payload = if i % 2 == 0 { vec![i; 100] } else { vec![t, i, 1, 2, 3] };
                        manager.write_object(&payload, "").unwrap();
                        total += payload.len() as u64;
                    }
                    total
                })
            })
            .collect();
        let expected: u64 = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .sum();

        let snap = manager.stats().snapshot();
        assert_eq!(snap.hashed_bytes, expected);
        assert_eq!(snap.hashed_objects, 400);
        // 25 shared payloads + 8 * 25 unique ones.
        assert_eq!(storage.len(), 225);
        for id in storage.list().unwrap() {
            manager.verify_object(&id).unwrap();
        }
    }
}
