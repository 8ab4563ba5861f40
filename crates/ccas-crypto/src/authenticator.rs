use std::io::{self, Read};

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{CryptoError, CryptoResult};
use crate::hasher::for_each_chunk;
use crate::keys::{ContentTag, MasterContentSecret, KEY_LEN};

type HmacSha512 = Hmac<Sha512>;

/// Keyed content authenticator for convergent encryption.
///
/// Computes HMAC-SHA-512 over plaintext, keyed by the repository's
/// [`MasterContentSecret`]. The keyed MAC state is built once and cloned per
/// call, so a single authenticator can be shared across threads.
#[derive(Clone)]
pub struct ContentAuthenticator {
    mac: HmacSha512,
}

impl ContentAuthenticator {
    pub fn new(secret: &MasterContentSecret) -> CryptoResult<Self> {
        Ok(Self {
            mac: keyed_mac(secret.as_bytes())?,
        })
    }

    /// Authenticate a complete buffer.
    pub fn authenticate(&self, data: &[u8]) -> ContentTag {
        let mut mac = self.mac.clone();
        mac.update(data);
        finish(mac)
    }

    /// Authenticate everything a reader yields, in bounded chunks. Returns
    /// the tag and the number of bytes consumed.
    pub fn authenticate_reader<R: Read>(&self, mut reader: R) -> io::Result<(ContentTag, u64)> {
        let mut mac = self.mac.clone();
        let total = for_each_chunk(&mut reader, |chunk| mac.update(chunk))?;
        Ok((finish(mac), total))
    }
}

/// HMAC-SHA-512 keyed with exactly [`KEY_LEN`] bytes of secret.
fn keyed_mac(key: &[u8]) -> CryptoResult<HmacSha512> {
    let invalid = || CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    };
    if key.len() != KEY_LEN {
        return Err(invalid());
    }
    HmacSha512::new_from_slice(key).map_err(|_| invalid())
}

fn finish(mac: HmacSha512) -> ContentTag {
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&mac.finalize().into_bytes());
    ContentTag::new(bytes)
}

impl std::fmt::Debug for ContentAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentAuthenticator(hmac-sha512)")
    }
}
