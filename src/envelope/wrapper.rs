use crate::crypto::AesGcmAead;
use crate::envelope::{encode, kms_wrap};
use crate::error::Result;
use crate::key::toolkit::{kek_cache_key, KeyToolkit};
use crate::key::{KeyBytes, KeyEncryptionKey};
use crate::kms::KmsConnectionConfig;
use crate::material::{
    FileKeyMaterialStore, KeyMaterial, KeyMetadata, COLUMN_KEY_REFERENCE_PREFIX,
    FOOTER_KEY_REFERENCE,
};
use crate::{Aead, KmsClient};
use std::sync::Arc;
use std::time::Duration;

/// Wraps the DEKs of one file and produces the key metadata stored with each key.
///
/// With a key material store, the key material goes to the sidecar document and
/// the returned metadata only references it; [`finish`](Self::finish) writes the
/// document once every key has been wrapped.
#[derive(Debug)]
pub struct KeyWrapper {
    toolkit: Arc<KeyToolkit>,
    client: Arc<dyn KmsClient>,
    connection: KmsConnectionConfig,
    lifetime: Duration,
    double_wrapping: bool,
    store: Option<FileKeyMaterialStore>,
    column_key_count: usize,
    aead: AesGcmAead,
}

impl KeyWrapper {
    /// Creates a wrapper; `connection` must name the KMS instance the client is bound to
    pub fn new(
        toolkit: Arc<KeyToolkit>,
        client: Arc<dyn KmsClient>,
        connection: KmsConnectionConfig,
        lifetime: Duration,
        double_wrapping: bool,
        store: Option<FileKeyMaterialStore>,
    ) -> Self {
        Self {
            toolkit,
            client,
            connection,
            lifetime,
            double_wrapping,
            store,
            column_key_count: 0,
            aead: AesGcmAead::new(),
        }
    }

    /// Wraps the footer DEK and returns its key metadata
    pub async fn wrap_footer_key(
        &mut self,
        dek: &KeyBytes,
        master_key_id: &str,
    ) -> Result<Vec<u8>> {
        self.wrap(dek, master_key_id, true).await
    }

    /// Wraps a column DEK and returns its key metadata
    pub async fn wrap_column_key(
        &mut self,
        dek: &KeyBytes,
        master_key_id: &str,
    ) -> Result<Vec<u8>> {
        self.wrap(dek, master_key_id, false).await
    }

    /// Writes the sidecar document, if key material is stored externally
    pub async fn finish(self) -> Result<()> {
        match &self.store {
            Some(store) => store.save().await,
            None => Ok(()),
        }
    }

    async fn wrap(
        &mut self,
        dek: &KeyBytes,
        master_key_id: &str,
        is_footer_key: bool,
    ) -> Result<Vec<u8>> {
        let internal_storage = self.store.is_none();

        let mut material = if self.double_wrapping {
            let kek = self.kek(master_key_id).await?;
            let wrapped_dek = self
                .aead
                .encrypt(dek.as_bytes(), kek.bytes().as_bytes(), kek.id())?;
            KeyMaterial::new(is_footer_key, internal_storage, master_key_id, encode(&wrapped_dek))
                .with_kek(kek.encoded_id(), kek.encoded_wrapped_key())
        } else {
            let wrapped_dek = kms_wrap(&*self.client, dek, master_key_id).await?;
            KeyMaterial::new(is_footer_key, internal_storage, master_key_id, wrapped_dek)
        };

        if is_footer_key {
            material = material.with_kms_instance(
                self.connection.kms_instance_id.as_str(),
                self.connection.kms_instance_url.as_str(),
            );
        }

        let Some(store) = &mut self.store else {
            return KeyMetadata::Internal(material).to_bytes();
        };

        let key_reference = if is_footer_key {
            FOOTER_KEY_REFERENCE.to_string()
        } else {
            self.column_key_count += 1;
            format!("{}{}", COLUMN_KEY_REFERENCE_PREFIX, self.column_key_count)
        };
        store.add_key_material(&key_reference, &material)?;

        KeyMetadata::External { key_reference }.to_bytes()
    }

    /// KEK for new DEKs under the master key, shared through the KEK write cache
    async fn kek(&self, master_key_id: &str) -> Result<KeyEncryptionKey> {
        let client = &*self.client;
        let token = self.connection.key_access_token();
        let cache_key = kek_cache_key(&self.connection.kms_instance_id, master_key_id);

        self.toolkit
            .kek_write_cache()
            .get_or_try_insert_with(&token, &cache_key, self.lifetime, || async move {
                let (bytes, id) = KeyEncryptionKey::generate_parts();
                let wrapped = kms_wrap(client, &bytes, master_key_id).await?;
                let encoded_id = encode(&id);
                log::debug!("created KEK {} for master key {}", encoded_id, master_key_id);

                Ok(KeyEncryptionKey::new(master_key_id, id, encoded_id, bytes, wrapped))
            })
            .await
    }
}
