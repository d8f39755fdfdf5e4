use crate::error::{Error, Result};
use crate::key::cache::TokenCache;
use crate::key::{KeyBytes, KeyEncryptionKey};
use crate::kms::KmsConnectionConfig;
use crate::{KmsClient, KmsClientFactory};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum time between two clears of the KEK write cache triggered by rotations
pub const KEK_WRITE_CACHE_CLEAN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Owner of the KMS client and key encryption key caches.
///
/// A toolkit is shared (via `Arc`) by every operation of a `CryptoFactory`.
/// Each cache is locked independently, so lookups for unrelated clients and
/// master keys do not serialize on one another.
pub struct KeyToolkit {
    factory: RwLock<Option<Arc<dyn KmsClientFactory>>>,

    /// KMS clients by KMS instance ID
    kms_clients: TokenCache<Arc<dyn KmsClient>>,

    /// KEKs used for wrapping new DEKs, by KMS instance and master key ID
    kek_write: TokenCache<KeyEncryptionKey>,

    /// Unwrapped KEKs, by KMS instance and encoded KEK ID
    kek_read: TokenCache<KeyBytes>,

    /// Exclusive locks for sidecar documents being rotated
    rotation_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,

    last_kek_write_clean: Mutex<Option<Instant>>,
}

impl fmt::Debug for KeyToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyToolkit")
            .field("has_factory", &self.factory.read().is_some())
            .field("kms_clients", &self.kms_clients)
            .field("kek_write", &self.kek_write)
            .field("kek_read", &self.kek_read)
            .finish()
    }
}

impl Default for KeyToolkit {
    fn default() -> Self {
        Self {
            factory: RwLock::new(None),
            kms_clients: TokenCache::new("kms_client_cache"),
            kek_write: TokenCache::new("kek_write_cache"),
            kek_read: TokenCache::new("kek_read_cache"),
            rotation_locks: Mutex::new(HashMap::new()),
            last_kek_write_clean: Mutex::new(None),
        }
    }
}

impl KeyToolkit {
    /// Creates a toolkit with empty caches and no registered factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the factory used for all subsequent client construction.
    ///
    /// Replaces any previously registered factory and evicts the clients it built.
    pub fn register_kms_client_factory(&self, factory: Arc<dyn KmsClientFactory>) {
        let replaced = self.factory.write().replace(factory).is_some();
        if replaced {
            log::debug!("replacing registered KMS client factory");
        }
        self.kms_clients.clear();
    }

    /// Gets a cached client for the connection or builds one with the registered factory
    pub async fn kms_client(
        &self,
        config: &KmsConnectionConfig,
        lifetime: Duration,
    ) -> Result<Arc<dyn KmsClient>> {
        let factory = self.factory.read().clone().ok_or_else(|| {
            Error::Configuration(
                "no KMS client factory registered; call register_kms_client_factory first".into(),
            )
        })?;

        let token = config.key_access_token();
        self.kms_clients
            .get_or_try_insert_with(&token, &config.kms_instance_id, lifetime, || async move {
                log::debug!("creating KMS client for instance {}", config.kms_instance_id);
                counter!("fileencryption.kms.client.create", 1);
                factory.create_client(config).await
            })
            .await
    }

    pub(crate) fn kek_write_cache(&self) -> &TokenCache<KeyEncryptionKey> {
        &self.kek_write
    }

    pub(crate) fn kek_read_cache(&self) -> &TokenCache<KeyBytes> {
        &self.kek_read
    }

    /// Removes every cached client and KEK owned by the given access token
    pub fn remove_cache_entries_for_token(&self, token: &str) {
        self.kms_clients.remove_token(token);
        self.kek_write.remove_token(token);
        self.kek_read.remove_token(token);
    }

    /// Removes every cached client and KEK
    pub fn remove_cache_entries_for_all_tokens(&self) {
        self.kms_clients.clear();
        self.kek_write.clear();
        self.kek_read.clear();
    }

    /// Lock guarding one sidecar document during rotation
    pub(crate) fn rotation_lock(&self, sidecar_path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.rotation_locks.lock();

        // Drop locks nobody is holding or waiting on
        locks.retain(|path, lock| path == sidecar_path || Arc::strong_count(lock) > 1);

        Arc::clone(locks.entry(sidecar_path.to_path_buf()).or_default())
    }

    /// Clears the KEK write cache unless that already happened within the last hour.
    ///
    /// After a rotation, new files must stop using KEKs wrapped with the old master
    /// key version.
    pub(crate) fn clean_kek_write_cache_for_rotation(&self) {
        let now = Instant::now();
        let mut last = self.last_kek_write_clean.lock();
        let due = last.map_or(true, |at| {
            now.saturating_duration_since(at) > KEK_WRITE_CACHE_CLEAN_INTERVAL
        });
        if due {
            self.kek_write.clear();
            *last = Some(now);
        }
    }
}

/// Key used by the KEK caches; KEKs are scoped to a KMS instance
pub(crate) fn kek_cache_key(kms_instance_id: &str, key: &str) -> String {
    format!("{}/{}", kms_instance_id, key)
}
