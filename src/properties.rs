use crate::config::EncryptionAlgorithm;
use crate::envelope::KeyUnwrapper;
use crate::error::Result;
use crate::key::KeyBytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// DEK and key metadata of one encrypted column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEncryptionProperties {
    key: KeyBytes,
    key_metadata: Vec<u8>,
}

impl ColumnEncryptionProperties {
    pub fn new(key: KeyBytes, key_metadata: Vec<u8>) -> Self {
        Self { key, key_metadata }
    }

    /// DEK handed to the column cipher
    pub fn key(&self) -> &KeyBytes {
        &self.key
    }

    /// Key metadata the container stores with the column
    pub fn key_metadata(&self) -> &[u8] {
        &self.key_metadata
    }
}

/// Encryption properties of each encrypted column, by column path
pub type ColumnPathToEncryptionPropertiesMap = BTreeMap<String, ColumnEncryptionProperties>;

/// Everything a container writer needs to encrypt one file
#[derive(Debug, Clone)]
pub struct FileEncryptionProperties {
    encryption_algorithm: EncryptionAlgorithm,
    plaintext_footer: bool,
    footer_key: KeyBytes,
    footer_key_metadata: Vec<u8>,
    uniform_encryption: bool,
    columns: ColumnPathToEncryptionPropertiesMap,
}

impl FileEncryptionProperties {
    pub(crate) fn new(
        encryption_algorithm: EncryptionAlgorithm,
        plaintext_footer: bool,
        footer_key: KeyBytes,
        footer_key_metadata: Vec<u8>,
        uniform_encryption: bool,
        columns: ColumnPathToEncryptionPropertiesMap,
    ) -> Self {
        Self {
            encryption_algorithm,
            plaintext_footer,
            footer_key,
            footer_key_metadata,
            uniform_encryption,
            columns,
        }
    }

    pub fn encryption_algorithm(&self) -> EncryptionAlgorithm {
        self.encryption_algorithm
    }

    pub fn plaintext_footer(&self) -> bool {
        self.plaintext_footer
    }

    /// DEK of the footer
    pub fn footer_key(&self) -> &KeyBytes {
        &self.footer_key
    }

    /// Key metadata the container stores with the footer
    pub fn footer_key_metadata(&self) -> &[u8] {
        &self.footer_key_metadata
    }

    /// True if every column is encrypted with the footer key
    pub fn uniform_encryption(&self) -> bool {
        self.uniform_encryption
    }

    /// Column keys; empty under uniform encryption
    pub fn column_keys(&self) -> &ColumnPathToEncryptionPropertiesMap {
        &self.columns
    }

    /// Encryption properties of a column, or `None` if the column is not encrypted.
    ///
    /// Under uniform encryption every column uses the footer key and metadata.
    pub fn column_properties(&self, column_path: &str) -> Option<ColumnEncryptionProperties> {
        if self.uniform_encryption {
            return Some(ColumnEncryptionProperties::new(
                self.footer_key.clone(),
                self.footer_key_metadata.clone(),
            ));
        }
        self.columns.get(column_path).cloned()
    }
}

/// Lazily resolves the keys of one file for a container reader.
///
/// Each key is unwrapped on first request and remembered for the lifetime of
/// this object, so columns that are never read cost no KMS calls.
pub struct FileDecryptionProperties {
    unwrapper: KeyUnwrapper,
    footer_key: OnceCell<KeyBytes>,
    column_keys: Mutex<HashMap<String, Arc<OnceCell<KeyBytes>>>>,
}

impl fmt::Debug for FileDecryptionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDecryptionProperties")
            .field("unwrapper", &self.unwrapper)
            .field("footer_key_resolved", &self.footer_key.initialized())
            .field("column_keys_len", &self.column_keys.lock().len())
            .finish()
    }
}

impl FileDecryptionProperties {
    pub(crate) fn new(unwrapper: KeyUnwrapper) -> Self {
        Self {
            unwrapper,
            footer_key: OnceCell::new(),
            column_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Footer DEK, unwrapped from the footer key metadata on first use
    pub async fn footer_key(&self, key_metadata: &[u8]) -> Result<KeyBytes> {
        self.footer_key
            .get_or_try_init(|| self.unwrapper.unwrap(key_metadata))
            .await
            .cloned()
    }

    /// DEK of a column, unwrapped from its key metadata on first use
    pub async fn column_key(&self, column_path: &str, key_metadata: &[u8]) -> Result<KeyBytes> {
        let cell = Arc::clone(
            self.column_keys
                .lock()
                .entry(column_path.to_string())
                .or_default(),
        );

        cell.get_or_try_init(|| self.unwrapper.unwrap(key_metadata))
            .await
            .cloned()
    }
}
