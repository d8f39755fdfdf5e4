use crate::config::{DecryptionConfiguration, EncryptionConfiguration, RotationConfiguration};
use crate::envelope::{KeyUnwrapper, KeyWrapper};
use crate::error::{Error, Result};
use crate::key::toolkit::KeyToolkit;
use crate::key::KeyBytes;
use crate::kms::KmsConnectionConfig;
use crate::material::FileKeyMaterialStore;
use crate::properties::{
    ColumnEncryptionProperties, ColumnPathToEncryptionPropertiesMap, FileDecryptionProperties,
    FileEncryptionProperties,
};
use crate::rotation;
use crate::{FileSystem, KmsClientFactory};
use metrics::counter;
use std::path::Path;
use std::sync::Arc;

/// Entry point for producing file encryption and decryption properties.
///
/// A factory owns a [`KeyToolkit`]; clone the `Arc` returned by
/// [`key_toolkit`](Self::key_toolkit) to share caches between factories.
#[derive(Debug, Default)]
pub struct CryptoFactory {
    toolkit: Arc<KeyToolkit>,
}

impl CryptoFactory {
    /// Creates a factory with its own, empty caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory that uses the given toolkit
    pub fn with_key_toolkit(toolkit: Arc<KeyToolkit>) -> Self {
        Self { toolkit }
    }

    /// The toolkit holding this factory's caches
    pub fn key_toolkit(&self) -> &Arc<KeyToolkit> {
        &self.toolkit
    }

    /// Installs the factory used to build KMS clients, replacing any previous one
    pub fn register_kms_client_factory(&self, factory: Arc<dyn KmsClientFactory>) {
        self.toolkit.register_kms_client_factory(factory);
    }

    /// Generates and wraps the keys of one file.
    ///
    /// `file_path` and `file_system` are required when the configuration stores key
    /// material externally. The sidecar document is only written once every key has
    /// been wrapped.
    pub async fn file_encryption_properties(
        &self,
        connection: &KmsConnectionConfig,
        config: &EncryptionConfiguration,
        file_path: Option<&Path>,
        file_system: Option<Arc<dyn FileSystem>>,
    ) -> Result<FileEncryptionProperties> {
        let column_keys = config.validate()?;

        let store = if config.internal_key_material {
            None
        } else {
            match (file_path, file_system) {
                (Some(path), Some(fs)) => Some(FileKeyMaterialStore::new(path, fs)?),
                _ => {
                    return Err(Error::Configuration(
                        "external key material requires a file path and file system".into(),
                    ))
                }
            }
        };

        let connection = connection.resolved(None, None);
        let client = self
            .toolkit
            .kms_client(&connection, config.cache_lifetime)
            .await?;

        let mut wrapper = KeyWrapper::new(
            Arc::clone(&self.toolkit),
            client,
            connection,
            config.cache_lifetime,
            config.double_wrapping,
            store,
        );

        let key_length = config.data_key_length_bytes();
        let footer_key = KeyBytes::generate(key_length);
        let footer_key_metadata = wrapper
            .wrap_footer_key(&footer_key, &config.footer_key)
            .await?;

        let mut columns = ColumnPathToEncryptionPropertiesMap::new();
        if let Some(column_keys) = &column_keys {
            for group in column_keys.groups() {
                let key = KeyBytes::generate(key_length);
                let key_metadata = wrapper.wrap_column_key(&key, &group.master_key_id).await?;
                for column_path in &group.column_paths {
                    columns.insert(
                        column_path.clone(),
                        ColumnEncryptionProperties::new(key.clone(), key_metadata.clone()),
                    );
                }
            }
        }

        wrapper.finish().await?;

        counter!("fileencryption.file.encryption_properties", 1);
        log::debug!(
            "created encryption properties: footer key {}, {} encrypted columns, \
             double wrapping {}",
            config.footer_key,
            columns.len(),
            config.double_wrapping
        );

        Ok(FileEncryptionProperties::new(
            config.encryption_algorithm,
            config.plaintext_footer,
            footer_key,
            footer_key_metadata,
            column_keys.is_none(),
            columns,
        ))
    }

    /// Creates a resolver for the keys of one file.
    ///
    /// Nothing is unwrapped until a key is requested. `file_path` and `file_system`
    /// must be given together; they are needed if the file's key material is stored
    /// externally.
    pub async fn file_decryption_properties(
        &self,
        connection: &KmsConnectionConfig,
        config: DecryptionConfiguration,
        file_path: Option<&Path>,
        file_system: Option<Arc<dyn FileSystem>>,
    ) -> Result<FileDecryptionProperties> {
        let unwrapper = KeyUnwrapper::new(
            Arc::clone(&self.toolkit),
            connection,
            config.cache_lifetime,
            file_path,
            file_system,
        )?;
        counter!("fileencryption.file.decryption_properties", 1);

        Ok(FileDecryptionProperties::new(unwrapper))
    }

    /// Drops cached KMS clients and KEKs of an access token that was revoked or replaced
    pub fn remove_cache_entries_for_token(&self, access_token: &str) {
        self.toolkit.remove_cache_entries_for_token(access_token);
    }

    /// Drops all cached KMS clients and KEKs
    pub fn remove_cache_entries_for_all_tokens(&self) {
        self.toolkit.remove_cache_entries_for_all_tokens();
    }

    /// Rewraps the keys of a file with the latest master key versions, using the
    /// default rotation settings
    pub async fn rotate_master_keys(
        &self,
        connection: &KmsConnectionConfig,
        file_path: &Path,
        file_system: Arc<dyn FileSystem>,
    ) -> Result<()> {
        self.rotate_master_keys_with(
            connection,
            file_path,
            file_system,
            &RotationConfiguration::default(),
        )
        .await
    }

    /// Rewraps the keys of a file with the latest master key versions.
    ///
    /// Only files written with external key material can be rotated. The DEKs, and so
    /// the encrypted file itself, are unchanged.
    pub async fn rotate_master_keys_with(
        &self,
        connection: &KmsConnectionConfig,
        file_path: &Path,
        file_system: Arc<dyn FileSystem>,
        config: &RotationConfiguration,
    ) -> Result<()> {
        rotation::rotate_master_keys(&self.toolkit, connection, file_path, file_system, config)
            .await
    }
}
