use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Length in bytes of the master secret and of derived encryption keys.
pub const KEY_LEN: usize = 32;

fn array_from_slice(bytes: &[u8]) -> CryptoResult<[u8; KEY_LEN]> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })
}

fn array_from_hex(s: &str) -> CryptoResult<[u8; KEY_LEN]> {
    let mut bytes = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    let out = array_from_slice(&bytes);
    bytes.zeroize();
    out
}

/// Repository-wide secret keying the content authenticator.
///
/// Created once at repository setup, owned by the repository configuration
/// and passed by reference to the encrypting formatter. Never serialized
/// alongside object data; wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterContentSecret([u8; KEY_LEN]);

impl MasterContentSecret {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        array_from_slice(bytes).map(Self)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        array_from_hex(s).map(Self)
    }

    /// Draw a fresh secret from the OS random source.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex form, for writing repository configuration.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for MasterContentSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterContentSecret(<redacted>)")
    }
}

/// Per-object AES-256 key derived from content (first half of a
/// [`ContentTag`]).
///
/// Exists transiently while an object is formatted and written; readers get
/// it back from the key index or the caller.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Rejects anything but exactly [`KEY_LEN`] bytes. The error is fatal.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        array_from_slice(bytes).map(Self)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        array_from_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex form, for handing the key to whoever must read the object back.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey(<redacted>)")
    }
}

/// 64-byte HMAC-SHA-512 output over an object's plaintext.
///
/// Split into two disjoint halves: bytes `[0, 32)` become the encryption key,
/// bytes `[32, 64)` become the identifier. The tag as a whole is never
/// exposed, so the two halves cannot end up in the same persisted value.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentTag([u8; 64]);

impl ContentTag {
    pub(crate) fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// The secret half: bytes `[0, 32)`.
    pub fn encryption_key(&self) -> EncryptionKey {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&self.0[..KEY_LEN]);
        EncryptionKey(key)
    }

    /// The public half: bytes `[32, 64)`, persisted as part of the object ID.
    pub fn identifier(&self) -> [u8; 32] {
        let mut id = [0u8; 32];
        id.copy_from_slice(&self.0[KEY_LEN..]);
        id
    }
}

impl std::fmt::Debug for ContentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentTag(<redacted>)")
    }
}
