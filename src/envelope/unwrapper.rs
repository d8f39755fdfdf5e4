use crate::crypto::AesGcmAead;
use crate::envelope::{decode, kms_unwrap};
use crate::error::{Error, Result};
use crate::key::toolkit::{kek_cache_key, KeyToolkit};
use crate::key::KeyBytes;
use crate::kms::KmsConnectionConfig;
use crate::material::{FileKeyMaterialStore, KeyMaterial, KeyMetadata, FOOTER_KEY_REFERENCE};
use crate::{Aead, FileSystem};
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Sidecar document of the file being read, loaded on first use
struct ExternalKeyMaterial {
    file_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    store: OnceCell<FileKeyMaterialStore>,
}

impl ExternalKeyMaterial {
    async fn store(&self) -> Result<&FileKeyMaterialStore> {
        self.store
            .get_or_try_init(|| async {
                FileKeyMaterialStore::load(&self.file_path, Arc::clone(&self.fs))
                    .await?
                    .ok_or_else(|| {
                        Error::KeyMaterial(format!(
                            "no key material document found for {}",
                            self.file_path.display()
                        ))
                    })
            })
            .await
    }
}

/// Recovers DEKs from the key metadata stored with a file
pub struct KeyUnwrapper {
    toolkit: Arc<KeyToolkit>,
    connection: KmsConnectionConfig,
    lifetime: Duration,
    external: Option<ExternalKeyMaterial>,

    /// Connection completed with the KMS instance recorded in the footer key material
    footer_connection: RwLock<Option<KmsConnectionConfig>>,

    aead: AesGcmAead,
}

impl fmt::Debug for KeyUnwrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyUnwrapper")
            .field("connection", &self.connection)
            .field("lifetime", &self.lifetime)
            .field(
                "file_path",
                &self.external.as_ref().map(|external| &external.file_path),
            )
            .finish()
    }
}

impl KeyUnwrapper {
    /// Creates an unwrapper.
    ///
    /// The file path and file system are needed for key material stored in a
    /// sidecar document and must be given together.
    pub fn new(
        toolkit: Arc<KeyToolkit>,
        connection: &KmsConnectionConfig,
        lifetime: Duration,
        file_path: Option<&Path>,
        fs: Option<Arc<dyn FileSystem>>,
    ) -> Result<Self> {
        let external = match (file_path, fs) {
            (Some(file_path), Some(fs)) => Some(ExternalKeyMaterial {
                file_path: file_path.to_path_buf(),
                fs,
                store: OnceCell::new(),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Configuration(
                    "file path and file system must be given together".into(),
                ))
            }
        };

        Ok(Self {
            toolkit,
            connection: connection.clone(),
            lifetime,
            external,
            footer_connection: RwLock::new(None),
            aead: AesGcmAead::new(),
        })
    }

    /// Unwraps the DEK described by the given key metadata
    pub async fn unwrap(&self, key_metadata: &[u8]) -> Result<KeyBytes> {
        let material = self.key_material(key_metadata).await?;
        let connection = self.connection_for(&material).await;
        let client = self.toolkit.kms_client(&connection, self.lifetime).await?;

        if !material.double_wrapping {
            return kms_unwrap(&*client, &material.wrapped_dek, &material.master_key_id).await;
        }

        let (kek_id, wrapped_kek) = material.kek()?;
        let master_key_id = material.master_key_id.as_str();
        let client = &*client;
        let kek = self
            .toolkit
            .kek_read_cache()
            .get_or_try_insert_with(
                &connection.key_access_token(),
                &kek_cache_key(&connection.kms_instance_id, kek_id),
                self.lifetime,
                || async move { kms_unwrap(client, wrapped_kek, master_key_id).await },
            )
            .await?;

        let dek = self
            .aead
            .decrypt(
                &decode(&material.wrapped_dek)?,
                kek.as_bytes(),
                &decode(kek_id)?,
            )
            .map_err(|e| {
                Error::KeyMaterial(format!(
                    "wrapped DEK under master key '{}' does not open with its KEK: {}",
                    material.master_key_id, e
                ))
            })?;
        Ok(KeyBytes::new(dek))
    }

    async fn key_material(&self, key_metadata: &[u8]) -> Result<KeyMaterial> {
        match KeyMetadata::parse(key_metadata)? {
            KeyMetadata::Internal(material) => Ok(material),
            KeyMetadata::External { key_reference } => {
                let external = self.external.as_ref().ok_or_else(|| {
                    Error::Configuration(
                        "key material is stored externally; \
                         a file path and file system are required"
                            .into(),
                    )
                })?;
                external.store().await?.key_material(&key_reference)
            }
        }
    }

    /// Connection for the KMS instance that wrapped the key.
    ///
    /// Only the footer key material records the KMS instance; column keys use the
    /// footer's, falling back to the defaults if it is not known.
    async fn connection_for(&self, material: &KeyMaterial) -> KmsConnectionConfig {
        if material.is_footer_key {
            let connection = self.connection.resolved(
                material.kms_instance_id.as_deref(),
                material.kms_instance_url.as_deref(),
            );
            *self.footer_connection.write() = Some(connection.clone());
            return connection;
        }

        let footer_connection = self.footer_connection.read().clone();
        if let Some(connection) = footer_connection {
            return connection;
        }

        if let Some(external) = &self.external {
            if let Ok(footer) = external
                .store()
                .await
                .and_then(|store| store.key_material(FOOTER_KEY_REFERENCE))
            {
                return self.connection.resolved(
                    footer.kms_instance_id.as_deref(),
                    footer.kms_instance_url.as_deref(),
                );
            }
        }

        self.connection.resolved(None, None)
    }
}
