//! Object formatting and storage for ccas.
//!
//! An object's ID is derived from its content by an [`ObjectFormatter`].
//! Plain repositories use a keyless digest and store bytes verbatim;
//! encrypted repositories use convergent encryption, so identical plaintext
//! deduplicates to a single ID while the stored ciphertext stays
//! confidential and tamper-evident.
//!
//! # Formatters
//!
//! - [`PlainFormatter`] -- `prefix ++ hex(digest)`, identity transform
//! - [`EncryptingFormatter`] -- `prefix ++ hex(id) ++ ".e"`, AES-256-CTR with
//!   per-segment HMAC-SHA-256
//!
//! # Storage Backends
//!
//! All backends implement the [`StorageBackend`] trait:
//!
//! - [`InMemoryStorage`] -- `HashMap`-based store for tests and embedding
//! - [`FsStorage`] -- one file per object under a sharded directory
//!
//! # Design Rules
//!
//! 1. The formatter is chosen once per repository and never changes.
//! 2. A write whose ID already exists never runs the write transform.
//! 3. Encrypted reads release no plaintext that failed authentication.
//! 4. Integrity failures stay distinguishable from ordinary I/O errors.

pub mod config;
pub mod error;
pub mod formatter;
pub mod fs;
pub mod keys;
pub mod manager;
pub mod memory;
pub mod stats;
pub mod traits;

pub use config::{FormatConfig, RepositoryConfig};
pub use error::{StoreError, StoreResult};
pub use formatter::{
    EncryptingFormatter, ObjectFormatter, ObjectReader, PlainFormatter, ReadTransform,
    StreamTransform, TransformedReader,
};
pub use fs::FsStorage;
pub use keys::{InMemoryKeyIndex, KeyIndex};
pub use manager::{ObjectManager, ObjectStream, WrittenObject};
pub use memory::InMemoryStorage;
pub use stats::{ObjectManagerStats, StatsSnapshot};
pub use traits::StorageBackend;
