use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of hex characters encoding the 32 content-derived bytes of an ID.
pub const CONTENT_HEX_LEN: usize = 64;

/// Suffix marking an object whose stored bytes are encrypted.
pub const ENCRYPTED_SUFFIX: &str = ".e";

/// Content-addressed identifier for a stored object.
///
/// The string form is `prefix ++ lowercase-hex(32 bytes) [++ ".e"]`. The 32
/// bytes are a pure function of the plaintext (and, for encrypted objects, of
/// the repository's master secret), so identical content always maps to the
/// same `ObjectId` and storage can deduplicate on it. Readers check
/// [`ObjectId::is_encrypted`] to decide which transform to apply.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// ID of an object stored verbatim.
    pub fn plain(prefix: &str, content: &[u8; 32]) -> Self {
        Self(format!("{prefix}{}", hex::encode(content)))
    }

    /// ID of an object stored through the encrypting transform.
    pub fn encrypted(prefix: &str, content: &[u8; 32]) -> Self {
        Self(format!("{prefix}{}{ENCRYPTED_SUFFIX}", hex::encode(content)))
    }

    /// Parse and validate the string form of an ID.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let body = s.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(s);
        if body.len() < CONTENT_HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: CONTENT_HEX_LEN,
                actual: body.len(),
            });
        }
        let content = &body.as_bytes()[body.len() - CONTENT_HEX_LEN..];
        if !content
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
        {
            return Err(TypeError::InvalidHex(
                String::from_utf8_lossy(content).into_owned(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// The full string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the ID carries the encrypted-object suffix.
    pub fn is_encrypted(&self) -> bool {
        self.0.ends_with(ENCRYPTED_SUFFIX)
    }

    fn body(&self) -> &str {
        self.0.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(&self.0)
    }

    /// The caller-supplied namespace prefix (may be empty).
    pub fn prefix(&self) -> &str {
        let body = self.body();
        &body[..body.len() - CONTENT_HEX_LEN]
    }

    /// The 64 hex characters derived from content.
    pub fn content_hex(&self) -> &str {
        let body = self.body();
        &body[body.len() - CONTENT_HEX_LEN..]
    }

    /// The 32 content-derived bytes.
    pub fn content_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (byte, pair) in out.iter_mut().zip(self.content_hex().as_bytes().chunks_exact(2)) {
            *byte = (nibble(pair[0]) << 4) | nibble(pair[1]);
        }
        out
    }

    /// Short representation (prefix plus first 8 hex characters).
    pub fn short(&self) -> String {
        format!("{}{}", self.prefix(), &self.content_hex()[..8])
    }
}

/// Value of one lowercase hex digit. Every constructor guarantees the
/// content part is lowercase hex.
fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        _ => c - b'a' + 10,
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.is_encrypted() { ENCRYPTED_SUFFIX } else { "" };
        write!(f, "ObjectId({}{suffix})", self.short())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CONTENT: [u8; 32] = [0xab; 32];

    #[test]
    fn plain_id_is_prefix_and_hex() {
        let id = ObjectId::plain("k", &CONTENT);
        assert_eq!(id.as_str().len(), 1 + CONTENT_HEX_LEN);
        assert!(id.as_str().starts_with("kabab"));
        assert!(!id.is_encrypted());
        assert_eq!(id.prefix(), "k");
    }

    #[test]
    fn encrypted_id_has_suffix() {
        let id = ObjectId::encrypted("", &CONTENT);
        assert_eq!(id.as_str().len(), 66);
        assert!(id.as_str().ends_with(".e"));
        assert!(id.is_encrypted());
        assert_eq!(id.prefix(), "");
        assert_eq!(id.content_hex(), hex::encode(CONTENT));
    }

    #[test]
    fn content_bytes_recovers_input() {
        let id = ObjectId::encrypted("p/", &CONTENT);
        assert_eq!(id.content_bytes(), CONTENT);
    }

    #[test]
    fn content_bytes_decodes_every_digit() {
        let mut content = [0u8; 32];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(0x39) ^ 0xa5;
        }
        content[0] = 0x00;
        content[1] = 0xff;
        content[2] = 0x9a;
        let parsed = ObjectId::parse(ObjectId::plain("", &content).as_str()).unwrap();
        assert_eq!(parsed.content_bytes(), content);
        assert_ne!(parsed.content_bytes(), [0u8; 32]);
    }

    #[test]
    fn parse_accepts_both_forms() {
        let plain = ObjectId::plain("x", &CONTENT);
        let enc = ObjectId::encrypted("x", &CONTENT);
        assert_eq!(ObjectId::parse(plain.as_str()).unwrap(), plain);
        assert_eq!(ObjectId::parse(enc.as_str()).unwrap(), enc);
        assert_ne!(plain, enc);
    }

    #[test]
    fn parse_rejects_short_input() {
        let err = ObjectId::parse("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 64,
                actual: 4
            }
        );
    }

    #[test]
    fn parse_rejects_uppercase_hex() {
        let s = "AB".repeat(32);
        assert!(matches!(ObjectId::parse(&s), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn parse_rejects_non_hex() {
        let s = format!("{}zz", "a".repeat(62));
        assert!(matches!(ObjectId::parse(&s), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn display_is_full_string() {
        let id = ObjectId::encrypted("pre", &CONTENT);
        assert_eq!(format!("{id}"), id.as_str());
    }

    #[test]
    fn debug_is_shortened() {
        let id = ObjectId::encrypted("", &CONTENT);
        assert_eq!(format!("{id:?}"), "ObjectId(abababab.e)");
    }

    #[test]
    fn serde_is_plain_string() {
        let id = ObjectId::encrypted("k", &CONTENT);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn serde_rejects_malformed() {
        let result: Result<ObjectId, _> = serde_json::from_str("\"nothex\"");
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn parse_recovers_prefix_and_content(
            prefix in "[a-z/]{0,8}",
            content in any::<[u8; 32]>(),
            encrypted in any::<bool>(),
        ) {
            let id = if encrypted {
                ObjectId::encrypted(&prefix, &content)
            } else {
                ObjectId::plain(&prefix, &content)
            };
            let parsed = ObjectId::parse(id.as_str()).unwrap();
            prop_assert_eq!(parsed.prefix(), prefix.as_str());
            prop_assert_eq!(parsed.content_bytes(), content);
            prop_assert_eq!(parsed.is_encrypted(), encrypted);
        }
    }
}
