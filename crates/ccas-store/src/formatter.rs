use std::io::{self, Read};

use ccas_crypto::{
    ContentAuthenticator, ContentHasher, CryptoResult, DecryptingReader, EncryptingReader,
    EncryptionKey, MasterContentSecret,
};
use ccas_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::stats::ObjectManagerStats;

/// Derives an object's ID and the transform applied to its bytes on write.
///
/// Implementations:
/// - [`PlainFormatter`] -- keyless digest, bytes stored verbatim
/// - [`EncryptingFormatter`] -- convergent encryption keyed by the master secret
///
/// The variant is chosen once when the repository is opened. `format` is a
/// pure function of `(data, prefix)` and the formatter's configuration; the
/// only side effect is bumping the hashing counters in `stats`.
pub trait ObjectFormatter: Send + Sync {
    /// Compute the ID of `data` under `prefix` and the transform to apply
    /// if the object has to be written.
    fn format(
        &self,
        data: &[u8],
        prefix: &str,
        stats: &ObjectManagerStats,
    ) -> (ObjectId, StreamTransform);

    /// Same as [`ObjectFormatter::format`], but digests `reader` in bounded
    /// chunks instead of requiring the whole object in memory.
    fn format_reader(
        &self,
        reader: &mut dyn Read,
        prefix: &str,
        stats: &ObjectManagerStats,
    ) -> io::Result<(ObjectId, StreamTransform)>;

    /// Short name for logs and configuration output.
    fn name(&self) -> &'static str;

    /// Whether IDs from this formatter carry the encrypted suffix.
    fn is_encrypting(&self) -> bool;
}

/// Formatter for repositories without a confidentiality requirement.
#[derive(Clone, Debug)]
pub struct PlainFormatter {
    hasher: ContentHasher,
}

impl PlainFormatter {
    pub fn new(hasher: ContentHasher) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }
}

impl ObjectFormatter for PlainFormatter {
    fn format(
        &self,
        data: &[u8],
        prefix: &str,
        stats: &ObjectManagerStats,
    ) -> (ObjectId, StreamTransform) {
        let digest = self.hasher.hash(data);
        stats.record_hashed(data.len() as u64);
        (ObjectId::plain(prefix, &digest), StreamTransform::Identity)
    }

    fn format_reader(
        &self,
        reader: &mut dyn Read,
        prefix: &str,
        stats: &ObjectManagerStats,
    ) -> io::Result<(ObjectId, StreamTransform)> {
        let (digest, len) = self.hasher.hash_reader(reader)?;
        stats.record_hashed(len);
        Ok((ObjectId::plain(prefix, &digest), StreamTransform::Identity))
    }

    fn name(&self) -> &'static str {
        self.hasher.algorithm().name()
    }

    fn is_encrypting(&self) -> bool {
        false
    }
}

/// Convergent-encryption formatter.
///
/// `tag = HMAC-SHA-512(master secret, data)`; the first half of the tag is
/// the object's AES-256 key, the second half its ID. Identical plaintext
/// under the same secret therefore gets the same ID even though every write
/// produces fresh ciphertext.
#[derive(Clone, Debug)]
pub struct EncryptingFormatter {
    authenticator: ContentAuthenticator,
}

impl EncryptingFormatter {
    pub fn new(secret: &MasterContentSecret) -> CryptoResult<Self> {
        Ok(Self {
            authenticator: ContentAuthenticator::new(secret)?,
        })
    }
}

impl ObjectFormatter for EncryptingFormatter {
    fn format(
        &self,
        data: &[u8],
        prefix: &str,
        stats: &ObjectManagerStats,
    ) -> (ObjectId, StreamTransform) {
        let tag = self.authenticator.authenticate(data);
        stats.record_hashed(data.len() as u64);
        let id = ObjectId::encrypted(prefix, &tag.identifier());
        (id, StreamTransform::Encrypt(tag.encryption_key()))
    }

    fn format_reader(
        &self,
        reader: &mut dyn Read,
        prefix: &str,
        stats: &ObjectManagerStats,
    ) -> io::Result<(ObjectId, StreamTransform)> {
        let (tag, len) = self.authenticator.authenticate_reader(reader)?;
        stats.record_hashed(len);
        let id = ObjectId::encrypted(prefix, &tag.identifier());
        Ok((id, StreamTransform::Encrypt(tag.encryption_key())))
    }

    fn name(&self) -> &'static str {
        "aes256-ctr-hmac-sha256"
    }

    fn is_encrypting(&self) -> bool {
        true
    }
}

/// Write-side transform returned by [`ObjectFormatter::format`].
///
/// Applied at most once, and only when the object does not exist yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamTransform {
    /// Bytes pass through unchanged.
    Identity,
    /// Encrypt and authenticate under the content-derived key.
    Encrypt(EncryptionKey),
}

impl StreamTransform {
    /// Wrap a plaintext reader. The encrypting variant draws a fresh IV here,
    /// so this fails only if the OS random source does.
    pub fn apply<R: Read>(&self, reader: R) -> CryptoResult<TransformedReader<R>> {
        match self {
            Self::Identity => Ok(TransformedReader::Plain(reader)),
            Self::Encrypt(key) => Ok(TransformedReader::Encrypted(EncryptingReader::new(
                reader, key,
            )?)),
        }
    }

    /// The matching read-side transform.
    pub fn inverse(&self) -> ReadTransform {
        match self {
            Self::Identity => ReadTransform::Identity,
            Self::Encrypt(key) => ReadTransform::Decrypt(key.clone()),
        }
    }

    pub fn encryption_key(&self) -> Option<&EncryptionKey> {
        match self {
            Self::Identity => None,
            Self::Encrypt(key) => Some(key),
        }
    }
}

/// Output of [`StreamTransform::apply`].
pub enum TransformedReader<R> {
    Plain(R),
    Encrypted(EncryptingReader<R>),
}

impl<R: Read> Read for TransformedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Encrypted(r) => r.read(buf),
        }
    }
}

/// Read-side inverse of [`StreamTransform`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadTransform {
    Identity,
    Decrypt(EncryptionKey),
}

impl ReadTransform {
    /// Pick the transform from the ID's suffix. Encrypted objects need the
    /// key the writer derived; plain objects ignore `key`.
    pub fn for_object(id: &ObjectId, key: Option<EncryptionKey>) -> StoreResult<Self> {
        if !id.is_encrypted() {
            return Ok(Self::Identity);
        }
        key.map(Self::Decrypt)
            .ok_or_else(|| StoreError::MissingKey(id.clone()))
    }

    pub fn apply<R: Read>(self, reader: R) -> ObjectReader<R> {
        match self {
            Self::Identity => ObjectReader::Plain(reader),
            Self::Decrypt(key) => ObjectReader::Decrypted(DecryptingReader::new(reader, key)),
        }
    }
}

/// Plaintext reader over stored object bytes.
pub enum ObjectReader<R> {
    Plain(R),
    Decrypted(DecryptingReader<R>),
}

impl<R: Read> Read for ObjectReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Decrypted(r) => r.read(buf),
        }
    }
}
