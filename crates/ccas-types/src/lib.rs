//! Foundation types for ccas, a convergent content-addressed object store.
//!
//! Every other ccas crate depends on `ccas-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-derived identifier, `prefix ++ hex(32 bytes) [++ ".e"]`
//! - [`TypeError`] -- Parse and validation failures

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::{ObjectId, CONTENT_HEX_LEN, ENCRYPTED_SUFFIX};
