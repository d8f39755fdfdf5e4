//! # File Encryption Key Management
//!
//! Envelope key management for files with column-level encryption.
//!
//! `fileencryption` turns a high level description of how a file should be encrypted
//! (which columns, which master keys, which cipher) into the low level material a
//! container writer needs: randomly generated data encryption keys (DEKs) and the
//! serialized key metadata that allows a reader to recover them later. Master keys
//! never leave the Key Management Service (KMS); DEKs are wrapped either directly by
//! a master key (single wrapping) or by a locally generated key encryption key (KEK)
//! that is itself wrapped by the master key (double wrapping).
//!
//! KMS clients and KEKs are cached per access token for a configurable lifetime, so
//! encrypting many files does not cost a KMS round trip per key. When key material is
//! stored in a sidecar document instead of the file footer, master keys can be rotated
//! without rewriting the encrypted file.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use fileencryption::config::{DecryptionConfiguration, EncryptionConfiguration};
//! use fileencryption::kms::{InMemoryKms, KmsConnectionConfig};
//! use fileencryption::CryptoFactory;
//! use std::sync::Arc;
//!
//! # async fn example() -> fileencryption::Result<()> {
//! // In production, register a factory that builds clients for your KMS
//! let kms = Arc::new(InMemoryKms::new());
//! kms.add_master_key("kf", vec![0_u8; 16])?;
//! kms.add_master_key("kc1", vec![1_u8; 16])?;
//!
//! let crypto_factory = CryptoFactory::new();
//! crypto_factory.register_kms_client_factory(kms.clone());
//!
//! let connection = KmsConnectionConfig::new();
//! let config = EncryptionConfiguration::new("kf").with_column_keys("kc1:ssn,salary");
//!
//! let encryption = crypto_factory
//!     .file_encryption_properties(&connection, &config, None, None)
//!     .await?;
//!
//! // The container writer stores `encryption.footer_key_metadata()` and each column's
//! // key metadata; a reader hands them back to recover the keys.
//! let decryption = crypto_factory
//!     .file_decryption_properties(&connection, DecryptionConfiguration::default(), None, None)
//!     .await?;
//! let footer_key = decryption
//!     .footer_key(encryption.footer_key_metadata())
//!     .await?;
//! assert_eq!(&footer_key, encryption.footer_key());
//! # Ok(())
//! # }
//! ```
//!
//! ## External Key Material and Rotation
//!
//! ```rust,no_run
//! use fileencryption::config::EncryptionConfiguration;
//! use fileencryption::fs::LocalFileSystem;
//! use fileencryption::kms::KmsConnectionConfig;
//! use fileencryption::{CryptoFactory, FileSystem};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn rotation(crypto_factory: CryptoFactory) -> fileencryption::Result<()> {
//! let connection = KmsConnectionConfig::new();
//! let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
//! let path = Path::new("/data/table/part-0.parquet");
//!
//! let config = EncryptionConfiguration::new("kf")
//!     .with_column_keys("kc1:ssn")
//!     .with_internal_key_material(false);
//! let _props = crypto_factory
//!     .file_encryption_properties(&connection, &config, Some(path), Some(fs.clone()))
//!     .await?;
//!
//! // Later, after new master key versions were created in the KMS
//! crypto_factory.rotate_master_keys(&connection, path, fs).await?;
//! # Ok(())
//! # }
//! ```

pub mod column_keys;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod fs;
pub mod key;
pub mod kms;
pub mod material;
pub mod properties;
pub mod rotation;
pub mod util;

// Re-export key types
pub use crate::column_keys::{ColumnKeyGroup, ColumnKeySpec};
pub use crate::config::{
    DecryptionConfiguration, EncryptionAlgorithm, EncryptionConfiguration, RotationConfiguration,
};
pub use crate::error::{Error, KmsOperation, Result};
pub use crate::factory::CryptoFactory;
pub use crate::key::toolkit::KeyToolkit;
pub use crate::key::KeyBytes;
pub use crate::kms::KmsConnectionConfig;
pub use crate::properties::{
    ColumnEncryptionProperties, ColumnPathToEncryptionPropertiesMap, FileDecryptionProperties,
    FileEncryptionProperties,
};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Client for a Key Management Service that holds the master keys.
///
/// Implementations must support key versioning: `wrap_key` always uses the latest
/// version of the master key, and `unwrap_key` resolves the version that produced
/// the wrapped bytes.
#[async_trait]
pub trait KmsClient: Send + Sync + fmt::Debug {
    /// Wraps a key with the latest version of the given master key
    async fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<Vec<u8>>;

    /// Unwraps a key previously wrapped with the given master key
    async fn unwrap_key(&self, wrapped_key: &[u8], master_key_identifier: &str)
        -> Result<Vec<u8>>;
}

/// Builds KMS clients for a connection configuration
#[async_trait]
pub trait KmsClientFactory: Send + Sync {
    /// Creates a client bound to the given connection configuration
    async fn create_client(&self, config: &KmsConnectionConfig) -> Result<Arc<dyn KmsClient>>;
}

/// File system used to store key material next to encrypted files
#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Reads a whole file; returns `None` if it does not exist
    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Creates or truncates a file with the given contents
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Moves a file, atomically replacing any existing file at the destination
    async fn rename_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Deletes a file; deleting a missing file is not an error
    async fn delete_file(&self, path: &Path) -> Result<()>;
}

/// AEAD (Authenticated Encryption with Associated Data) interface
pub trait Aead: Send + Sync + fmt::Debug {
    /// Encrypts data using the provided key
    fn encrypt(&self, data: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts data using the provided key
    fn decrypt(&self, data: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}
