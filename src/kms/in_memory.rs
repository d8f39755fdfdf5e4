use crate::crypto::AesGcmAead;
use crate::error::{Error, Result};
use crate::key::KeyBytes;
use crate::{Aead, KmsClient, KmsClientFactory, KmsConnectionConfig};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Size of the version prefix on wrapped keys
const VERSION_SIZE: usize = 4;

/// An in-memory key management service for testing and development.
///
/// Each master key has a list of versions. Wrapping always uses the latest version
/// and prefixes the result with its version number; unwrapping uses the version
/// recorded in the wrapped bytes, so keys wrapped before a rotation stay readable.
/// Clones share the same master keys.
#[derive(Clone, Default)]
pub struct InMemoryKms {
    /// Master key versions by master key ID, oldest first
    master_keys: Arc<RwLock<HashMap<String, Vec<KeyBytes>>>>,

    /// AEAD implementation for encryption/decryption
    aead: AesGcmAead,
}

impl fmt::Debug for InMemoryKms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.master_keys.read();
        let mut names: Vec<_> = keys.keys().collect();
        names.sort();
        f.debug_struct("InMemoryKms")
            .field("master_keys", &names)
            .finish()
    }
}

impl InMemoryKms {
    /// Creates a KMS with no master keys
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the first version of a master key
    pub fn add_master_key(&self, id: impl Into<String>, key: Vec<u8>) -> Result<()> {
        let id = id.into();
        check_master_key(&id, &key)?;

        let mut keys = self.master_keys.write();
        if keys.contains_key(&id) {
            return Err(Error::KmsService(format!(
                "master key '{}' already exists",
                id
            )));
        }
        keys.insert(id, vec![KeyBytes::new(key)]);
        Ok(())
    }

    /// Adds a new version of an existing master key and returns its version number
    pub fn rotate_master_key(&self, id: &str, key: Vec<u8>) -> Result<u32> {
        check_master_key(id, &key)?;

        let mut keys = self.master_keys.write();
        let versions = keys
            .get_mut(id)
            .ok_or_else(|| Error::KmsService(format!("master key '{}' not found", id)))?;
        versions.push(KeyBytes::new(key));

        log::debug!("rotated master key {} to version {}", id, versions.len() - 1);
        Ok((versions.len() - 1) as u32)
    }

    /// Latest version number of a master key
    pub fn current_version(&self, id: &str) -> Option<u32> {
        self.master_keys
            .read()
            .get(id)
            .map(|versions| (versions.len() - 1) as u32)
    }

    /// Version number recorded in a wrapped key
    pub fn wrapped_version(wrapped_key: &[u8]) -> Result<u32> {
        let prefix: [u8; VERSION_SIZE] = wrapped_key
            .get(..VERSION_SIZE)
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| Error::KmsService("wrapped key is too short".into()))?;
        Ok(u32::from_be_bytes(prefix))
    }

    fn master_key(&self, id: &str, version: Option<u32>) -> Result<(u32, KeyBytes)> {
        let keys = self.master_keys.read();
        let versions = keys
            .get(id)
            .ok_or_else(|| Error::KmsService(format!("master key '{}' not found", id)))?;

        let version = version.unwrap_or((versions.len() - 1) as u32);
        let key = versions.get(version as usize).ok_or_else(|| {
            Error::KmsService(format!(
                "version {} of master key '{}' not found",
                version, id
            ))
        })?;
        Ok((version, key.clone()))
    }
}

fn check_master_key(id: &str, key: &[u8]) -> Result<()> {
    if id.is_empty() {
        return Err(Error::KmsService("master key ID is empty".into()));
    }
    if ![16, 24, 32].contains(&key.len()) {
        return Err(Error::KmsService(format!(
            "master key '{}' has unsupported length {}",
            id,
            key.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl KmsClient for InMemoryKms {
    async fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<Vec<u8>> {
        let (version, master_key) = self.master_key(master_key_identifier, None)?;
        let sealed = self.aead.encrypt(
            key_bytes,
            master_key.as_bytes(),
            master_key_identifier.as_bytes(),
        )?;

        let mut wrapped = Vec::with_capacity(VERSION_SIZE + sealed.len());
        wrapped.extend_from_slice(&version.to_be_bytes());
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    async fn unwrap_key(
        &self,
        wrapped_key: &[u8],
        master_key_identifier: &str,
    ) -> Result<Vec<u8>> {
        let version = Self::wrapped_version(wrapped_key)?;
        let (_, master_key) = self.master_key(master_key_identifier, Some(version))?;
        self.aead.decrypt(
            &wrapped_key[VERSION_SIZE..],
            master_key.as_bytes(),
            master_key_identifier.as_bytes(),
        )
    }
}

#[async_trait]
impl KmsClientFactory for InMemoryKms {
    async fn create_client(&self, _config: &KmsConnectionConfig) -> Result<Arc<dyn KmsClient>> {
        Ok(Arc::new(self.clone()))
    }
}
