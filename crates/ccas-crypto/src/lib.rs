//! Cryptographic primitives for ccas.
//!
//! Provides keyless content hashing for plain repositories, HMAC-SHA-512
//! content authentication for convergent encryption, and the streaming
//! AES-256-CTR + HMAC-SHA-256 transform that protects encrypted objects at
//! rest.
//!
//! All crypto operations wrap established libraries -- no custom cryptography.

pub mod authenticator;
pub mod error;
pub mod hasher;
pub mod keys;
pub mod stream;

pub use authenticator::ContentAuthenticator;
pub use error::{CryptoError, CryptoResult};
pub use hasher::{ContentHasher, HashAlgorithm};
pub use keys::{ContentTag, EncryptionKey, MasterContentSecret, KEY_LEN};
pub use stream::{encrypted_len, DecryptingReader, EncryptingReader, IV_LEN, SEGMENT_SIZE, TAG_LEN};
