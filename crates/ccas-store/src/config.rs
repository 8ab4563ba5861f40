use std::path::Path;

use ccas_crypto::{ContentHasher, HashAlgorithm, MasterContentSecret};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::formatter::{EncryptingFormatter, ObjectFormatter, PlainFormatter};

/// Repository-level configuration, stored as TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub format: FormatConfig,
}

impl RepositoryConfig {
    /// File name of the configuration inside a repository directory.
    pub const FILE_NAME: &'static str = "ccas.toml";

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Write to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

/// Which formatter a repository uses, fixed when the repository is opened.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Convergent encryption instead of plain digests.
    pub encryption: bool,
    /// Digest for plain repositories; ignored when `encryption` is set.
    pub hash: HashAlgorithm,
    /// Hex-encoded 32-byte master content secret. Required when
    /// `encryption` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_secret: Option<String>,
}

impl FormatConfig {
    pub fn plain(hash: HashAlgorithm) -> Self {
        Self {
            hash,
            ..Default::default()
        }
    }

    pub fn encrypted(secret: &MasterContentSecret) -> Self {
        Self {
            encryption: true,
            master_secret: Some(secret.to_hex()),
            ..Default::default()
        }
    }

    /// Decode the master secret, if one is configured.
    pub fn master_secret(&self) -> StoreResult<Option<MasterContentSecret>> {
        self.master_secret
            .as_deref()
            .map(MasterContentSecret::from_hex)
            .transpose()
            .map_err(|e| StoreError::Config(format!("master_secret: {e}")))
    }

    /// Construct the formatter this configuration selects.
    pub fn build_formatter(&self) -> StoreResult<Box<dyn ObjectFormatter>> {
        if !self.encryption {
            return Ok(Box::new(PlainFormatter::new(ContentHasher::new(self.hash))));
        }
        let secret = self.master_secret()?.ok_or_else(|| {
            StoreError::Config("encryption is enabled but no master_secret is set".into())
        })?;
        Ok(Box::new(EncryptingFormatter::new(&secret)?))
    }
}

impl std::fmt::Debug for FormatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatConfig")
            .field("encryption", &self.encryption)
            .field("hash", &self.hash)
            .field(
                "master_secret",
                &self.master_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
