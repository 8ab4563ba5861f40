use std::io;

use ccas_crypto::CryptoError;
use ccas_types::{ObjectId, TypeError};

/// Errors from formatting, storage, and object manager operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// An encrypted object was opened without its encryption key.
    #[error("no encryption key known for {0}")]
    MissingKey(ObjectId),

    /// Recomputing the ID from recovered content gave a different ID.
    #[error("content mismatch for {id}: recomputed {computed}")]
    HashMismatch { id: ObjectId, computed: ObjectId },

    /// This manager's formatter cannot re-derive IDs of this kind.
    #[error("{formatter} formatter cannot verify {id}")]
    FormatterMismatch {
        id: ObjectId,
        formatter: &'static str,
    },

    /// The ID cannot be used by this backend (e.g. contains a path separator).
    #[error("invalid object id for this backend: {0}")]
    InvalidId(String),

    /// Cipher, MAC, or entropy failure, including tampered ciphertext.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid id: {0}")]
    Type(#[from] TypeError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Repository configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Classify an I/O error coming out of a transform reader: integrity and
    /// key failures keep their crypto identity instead of becoming plain I/O.
    pub fn from_stream(err: io::Error) -> Self {
        match CryptoError::from_io(&err) {
            Some(crypto) => Self::Crypto(crypto),
            None => Self::Io(err),
        }
    }

    /// Returns `true` if stored bytes failed authentication.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Crypto(e) if e.is_integrity())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_errors_keep_crypto_identity() {
        let tampered = CryptoError::IntegrityFailure { segment: 1, reason: "tag mismatch" };
        let err = StoreError::from_stream(tampered.clone().into());
        assert!(err.is_integrity());
        assert!(matches!(err, StoreError::Crypto(e) if e == tampered));
    }

    #[test]
    fn plain_io_stays_io() {
        let err = StoreError::from_stream(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!err.is_integrity());
    }
}
