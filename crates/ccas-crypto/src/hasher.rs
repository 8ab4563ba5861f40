use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::CryptoError;

/// Chunk size for streaming digest passes.
const READ_CHUNK: usize = 64 * 1024;

/// Keyless digest used to derive IDs in plain repositories.
///
/// Every variant produces 32 bytes, so plain IDs share the encrypted IDs'
/// 64-hex-character layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "sha256")]
    Sha256,
    #[serde(rename = "sha512-256")]
    Sha512_256,
    #[default]
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [Self; 3] = [Self::Sha256, Self::Sha512_256, Self::Blake3];

    /// Configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512_256 => "sha512-256",
            Self::Blake3 => "blake3",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name() == s)
            .ok_or_else(|| CryptoError::UnknownAlgorithm(s.to_string()))
    }
}

enum DigestState {
    Sha256(sha2::Sha256),
    Sha512_256(sha2::Sha512_256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512_256 => Self::Sha512_256(sha2::Sha512_256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512_256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        match self {
            Self::Sha256(h) => out.copy_from_slice(&h.finalize()),
            Self::Sha512_256(h) => out.copy_from_slice(&h.finalize()),
            Self::Blake3(h) => out = *h.finalize().as_bytes(),
        }
        out
    }
}

/// Keyless content hasher for plain (non-confidential) repositories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
}

impl ContentHasher {
    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest a complete buffer.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut state = DigestState::new(self.algorithm);
        state.update(data);
        state.finalize()
    }

    /// Digest everything a reader yields, in bounded chunks. Returns the
    /// digest and the number of bytes consumed.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<([u8; 32], u64)> {
        let mut state = DigestState::new(self.algorithm);
        let total = for_each_chunk(&mut reader, |chunk| state.update(chunk))?;
        Ok((state.finalize(), total))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &[u8; 32]) -> bool {
        self.hash(data) == *expected
    }
}

/// Feed a reader to `f` in chunks until EOF; returns the byte count.
pub(crate) fn for_each_chunk<R: Read>(
    reader: &mut R,
    mut f: impl FnMut(&[u8]),
) -> io::Result<u64> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                f(&buf[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
