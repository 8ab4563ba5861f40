use std::io;

/// Errors from cryptographic operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material of the wrong size reached a cipher or MAC. Indicates a
    /// configuration or programming defect; never retry.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The OS random source could not supply an IV or secret.
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// Stored ciphertext failed authentication: it was tampered with,
    /// truncated, or corrupted.
    #[error("integrity check failed at segment {segment}: {reason}")]
    IntegrityFailure { segment: u64, reason: &'static str },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
}

impl CryptoError {
    /// Unrecoverable errors that indicate a broken invariant or environment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidKeyLength { .. } | Self::Entropy(_))
    }

    /// Returns `true` for tamper/corruption failures on the decrypt path.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::IntegrityFailure { .. })
    }

    /// Recover a `CryptoError` carried inside an `io::Error` produced by
    /// one of the stream readers.
    pub fn from_io(err: &io::Error) -> Option<Self> {
        err.get_ref()?.downcast_ref::<Self>().cloned()
    }
}

impl From<CryptoError> for io::Error {
    fn from(err: CryptoError) -> Self {
        let kind = match err {
            CryptoError::IntegrityFailure { .. } => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(CryptoError::InvalidKeyLength { expected: 32, actual: 16 }.is_fatal());
        assert!(CryptoError::Entropy("exhausted".into()).is_fatal());
        let tampered = CryptoError::IntegrityFailure { segment: 0, reason: "tag mismatch" };
        assert!(!tampered.is_fatal());
        assert!(tampered.is_integrity());
    }

    #[test]
    fn io_roundtrip_preserves_error() {
        let err = CryptoError::IntegrityFailure { segment: 3, reason: "tag mismatch" };
        let io_err: io::Error = err.clone().into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(CryptoError::from_io(&io_err), Some(err));
    }

    #[test]
    fn plain_io_error_is_not_crypto() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        assert_eq!(CryptoError::from_io(&io_err), None);
    }
}
