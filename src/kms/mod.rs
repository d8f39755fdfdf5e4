//! KMS connection settings and client implementations
//!
//! - `KmsConnectionConfig` identifies the KMS instance and carries the access token
//! - `InMemoryKms` is a versioned in-process KMS for testing and development
//! - Production clients are added by implementing the `KmsClient` and
//!   `KmsClientFactory` traits

mod in_memory;

pub use in_memory::InMemoryKms;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Value used for the KMS instance ID, URL and access token when none is configured
pub const DEFAULT_KMS_SETTING: &str = "DEFAULT";

/// Connection settings for a KMS.
///
/// Clones share the access token, so refreshing it through any clone is visible
/// to every holder. Cached clients and KEKs are owned by the token that was
/// current when they were created.
#[derive(Clone)]
pub struct KmsConnectionConfig {
    /// ID of the KMS instance that will be used for encryption
    pub kms_instance_id: String,

    /// URL of the KMS instance
    pub kms_instance_url: String,

    /// Custom KMS client settings
    pub custom_kms_conf: HashMap<String, String>,

    key_access_token: Arc<RwLock<String>>,
}

impl Default for KmsConnectionConfig {
    fn default() -> Self {
        Self {
            kms_instance_id: String::new(),
            kms_instance_url: String::new(),
            custom_kms_conf: HashMap::new(),
            key_access_token: Arc::new(RwLock::new(DEFAULT_KMS_SETTING.to_string())),
        }
    }
}

impl fmt::Debug for KmsConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsConnectionConfig")
            .field("kms_instance_id", &self.kms_instance_id)
            .field("kms_instance_url", &self.kms_instance_url)
            .field("custom_kms_conf", &self.custom_kms_conf)
            .field("key_access_token", &"<hidden>")
            .finish()
    }
}

impl KmsConnectionConfig {
    /// Creates a config with the default access token and no instance settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the KMS instance ID
    pub fn with_kms_instance_id(mut self, id: impl Into<String>) -> Self {
        self.kms_instance_id = id.into();
        self
    }

    /// Sets the KMS instance URL
    pub fn with_kms_instance_url(mut self, url: impl Into<String>) -> Self {
        self.kms_instance_url = url.into();
        self
    }

    /// Sets the access token
    pub fn with_key_access_token(self, token: impl Into<String>) -> Self {
        self.refresh_key_access_token(token);
        self
    }

    /// Adds a custom client setting
    pub fn with_custom_kms_conf(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.custom_kms_conf.insert(key.into(), value.into());
        self
    }

    /// Current access token
    pub fn key_access_token(&self) -> String {
        self.key_access_token.read().clone()
    }

    /// Replaces the access token for this config and all of its clones
    pub fn refresh_key_access_token(&self, token: impl Into<String>) {
        *self.key_access_token.write() = token.into();
    }

    /// Fills a blank instance ID and URL, preferring the given values from stored key
    /// material and falling back to the defaults
    pub(crate) fn resolved(&self, instance_id: Option<&str>, instance_url: Option<&str>) -> Self {
        let mut config = self.clone();
        if config.kms_instance_id.is_empty() {
            config.kms_instance_id = instance_id
                .filter(|id| !id.is_empty())
                .unwrap_or(DEFAULT_KMS_SETTING)
                .to_string();
        }
        if config.kms_instance_url.is_empty() {
            config.kms_instance_url = instance_url
                .filter(|url| !url.is_empty())
                .unwrap_or(DEFAULT_KMS_SETTING)
                .to_string();
        }
        config
    }
}
