//! Authenticated streaming encryption for object bytes at rest.
//!
//! Wire format:
//!
//! ```text
//! [16 bytes: random IV]
//! [<= 64 KiB: ciphertext_0][32 bytes: tag_0]
//! ...
//! [<= 64 KiB: ciphertext_n][32 bytes: tag_n]     (final segment)
//!
//! tag_i = HMAC-SHA256(mac_key, IV || u64_be(i) || final_flag || ciphertext_i)
//! mac_key = HKDF-SHA256(ikm = encryption key, info = "ccas-object-mac-v1")
//! ```
//!
//! The AES-256-CTR keystream starts at the IV and runs continuously across
//! segments. Only the last segment has `final_flag = 1`, so truncation at a
//! segment boundary fails authentication. Empty plaintext is encoded as a
//! single empty final segment.
//!
//! Both readers hold at most one segment in memory. [`DecryptingReader`]
//! checks each segment's tag before releasing any of its plaintext.

use std::io::{self, Read};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{EncryptionKey, KEY_LEN};

/// AES block size; the IV length.
pub const IV_LEN: usize = 16;
/// Length of each segment's HMAC-SHA256 tag.
pub const TAG_LEN: usize = 32;
/// Maximum plaintext bytes per authenticated segment.
pub const SEGMENT_SIZE: usize = 64 * 1024;

const MAC_INFO: &[u8] = b"ccas-object-mac-v1";

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Total encrypted size for a plaintext of `plaintext_len` bytes.
pub fn encrypted_len(plaintext_len: u64) -> u64 {
    let segment = SEGMENT_SIZE as u64;
    let segments = plaintext_len.div_ceil(segment).max(1);
    IV_LEN as u64 + plaintext_len + segments * TAG_LEN as u64
}

/// Keystream plus per-segment MAC shared by both directions.
struct SegmentCipher {
    ctr: Aes256Ctr,
    mac: HmacSha256,
    iv: [u8; IV_LEN],
    index: u64,
}

impl SegmentCipher {
    fn new(key: &EncryptionKey, iv: [u8; IV_LEN]) -> CryptoResult<Self> {
        let invalid = |actual| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual,
        };
        let ctr = Aes256Ctr::new_from_slices(key.as_bytes(), &iv)
            .map_err(|_| invalid(key.as_bytes().len()))?;

        let mut mac_key = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha256>::new(None, key.as_bytes())
            .expand(MAC_INFO, &mut mac_key[..])
            .map_err(|_| invalid(32))?;
        let mac = HmacSha256::new_from_slice(&mac_key[..]).map_err(|_| invalid(32))?;

        Ok(Self {
            ctr,
            mac,
            iv,
            index: 0,
        })
    }

    fn segment_mac(&self, is_final: bool, ciphertext: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(&self.iv);
        mac.update(&self.index.to_be_bytes());
        mac.update(&[u8::from(is_final)]);
        mac.update(ciphertext);
        mac
    }

    fn seal(&mut self, is_final: bool, segment: &mut Vec<u8>) {
        self.ctr.apply_keystream(segment);
        let tag = self.segment_mac(is_final, segment).finalize().into_bytes();
        segment.extend_from_slice(&tag);
        self.index += 1;
    }

    /// Verify `record` (ciphertext || tag) and decrypt it in place, leaving
    /// only plaintext. Nothing is decrypted unless the tag matches.
    fn open(&mut self, is_final: bool, record: &mut Vec<u8>) -> CryptoResult<()> {
        if record.len() < TAG_LEN {
            return Err(CryptoError::IntegrityFailure {
                segment: self.index,
                reason: "segment shorter than its tag",
            });
        }
        let split = record.len() - TAG_LEN;
        self.segment_mac(is_final, &record[..split])
            .verify_slice(&record[split..])
            .map_err(|_| CryptoError::IntegrityFailure {
                segment: self.index,
                reason: "authentication tag mismatch",
            })?;
        record.truncate(split);
        self.ctr.apply_keystream(record);
        self.index += 1;
        Ok(())
    }
}

/// Read from `inner` until `buf` holds `target` bytes or EOF.
fn fill_buffer<R: Read>(inner: &mut R, buf: &mut Vec<u8>, target: usize) -> io::Result<()> {
    let mut filled = buf.len();
    buf.resize(target.max(filled), 0);
    while filled < target {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                buf.truncate(filled);
                return Err(e);
            }
        }
    }
    buf.truncate(filled);
    Ok(())
}

/// Split off the first `len` bytes of `buf`, leaving the rest in place.
fn take_front(buf: &mut Vec<u8>, len: usize) -> Vec<u8> {
    let rest = buf.split_off(len);
    std::mem::replace(buf, rest)
}

/// Pending output bytes with a read cursor.
#[derive(Default)]
struct Pending {
    bytes: Vec<u8>,
    pos: usize,
}

impl Pending {
    fn is_drained(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn set(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
        self.pos = 0;
    }

    fn copy_to(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.bytes.len() - self.pos);
        out[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// Encrypt-and-authenticate decorator over a plaintext reader.
///
/// Owns the inner reader. Yields the IV, then sealed segments, as the
/// plaintext streams through.
pub struct EncryptingReader<R> {
    inner: R,
    cipher: SegmentCipher,
    plaintext: Vec<u8>,
    out: Pending,
    finished: bool,
}

impl<R: Read> EncryptingReader<R> {
    /// Wrap `inner`, drawing a fresh IV from the OS random source.
    pub fn new(inner: R, key: &EncryptionKey) -> CryptoResult<Self> {
        Self::with_rng(inner, key, &mut OsRng)
    }

    /// Wrap `inner`, drawing the IV from `rng`. A failing source surfaces
    /// as [`CryptoError::Entropy`]; nothing is retried.
    pub fn with_rng<G: RngCore + ?Sized>(
        inner: R,
        key: &EncryptionKey,
        rng: &mut G,
    ) -> CryptoResult<Self> {
        let mut iv = [0u8; IV_LEN];
        rng.try_fill_bytes(&mut iv)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;
        Self::with_iv(inner, key, iv)
    }

    /// Wrap `inner` with a caller-chosen IV. An IV must never be reused
    /// under the same key.
    pub fn with_iv(inner: R, key: &EncryptionKey, iv: [u8; IV_LEN]) -> CryptoResult<Self> {
        let cipher = SegmentCipher::new(key, iv)?;
        Ok(Self {
            inner,
            cipher,
            plaintext: Vec::with_capacity(SEGMENT_SIZE + 1),
            out: Pending {
                bytes: iv.to_vec(),
                pos: 0,
            },
            finished: false,
        })
    }

    /// Give back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn next_segment(&mut self) -> io::Result<()> {
        // One byte of lookahead tells a full segment from the final one.
        fill_buffer(&mut self.inner, &mut self.plaintext, SEGMENT_SIZE + 1)?;
        let is_final = self.plaintext.len() <= SEGMENT_SIZE;
        let len = self.plaintext.len().min(SEGMENT_SIZE);
        let mut segment = take_front(&mut self.plaintext, len);
        self.cipher.seal(is_final, &mut segment);
        self.out.set(segment);
        self.finished = is_final;
        Ok(())
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if !self.out.is_drained() {
                return Ok(self.out.copy_to(buf));
            }
            if self.finished {
                return Ok(0);
            }
            self.next_segment()?;
        }
    }
}

/// Verify-and-decrypt decorator over a reader of [`EncryptingReader`]
/// output.
///
/// Plaintext is released one verified segment at a time. Any tag mismatch,
/// truncation, or trailing garbage fails the read with an `InvalidData`
/// error wrapping [`CryptoError::IntegrityFailure`]; once failed, every
/// later read fails the same way.
pub struct DecryptingReader<R> {
    inner: R,
    key: EncryptionKey,
    cipher: Option<SegmentCipher>,
    record: Vec<u8>,
    out: Pending,
    finished: bool,
    failed: Option<CryptoError>,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(inner: R, key: EncryptionKey) -> Self {
        Self {
            inner,
            key,
            cipher: None,
            record: Vec::with_capacity(SEGMENT_SIZE + TAG_LEN + 1),
            out: Pending::default(),
            finished: false,
            failed: None,
        }
    }

    /// Give back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn next_segment(&mut self) -> io::Result<()> {
        if self.cipher.is_none() {
            self.cipher = Some(read_header(&mut self.inner, &self.key)?);
        }
        let Some(cipher) = self.cipher.as_mut() else {
            return Err(CryptoError::IntegrityFailure {
                segment: 0,
                reason: "missing stream header",
            }
            .into());
        };
        fill_buffer(&mut self.inner, &mut self.record, SEGMENT_SIZE + TAG_LEN + 1)?;
        let is_final = self.record.len() <= SEGMENT_SIZE + TAG_LEN;
        let len = self.record.len().min(SEGMENT_SIZE + TAG_LEN);
        let mut segment = take_front(&mut self.record, len);
        cipher.open(is_final, &mut segment)?;
        self.out.set(segment);
        self.finished = is_final;
        Ok(())
    }
}

/// Read the IV header and set up the cipher for the rest of the stream.
fn read_header<R: Read>(inner: &mut R, key: &EncryptionKey) -> io::Result<SegmentCipher> {
    let mut header = Vec::with_capacity(IV_LEN);
    fill_buffer(inner, &mut header, IV_LEN)?;
    let iv: [u8; IV_LEN] =
        header
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::IntegrityFailure {
                segment: 0,
                reason: "stream shorter than its IV",
            })?;
    Ok(SegmentCipher::new(key, iv)?)
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.failed {
            return Err(err.clone().into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if !self.out.is_drained() {
                return Ok(self.out.copy_to(buf));
            }
            if self.finished {
                return Ok(0);
            }
            if let Err(e) = self.next_segment() {
                if let Some(crypto) = CryptoError::from_io(&e) {
                    self.failed = Some(crypto);
                }
                return Err(e);
            }
        }
    }
}
