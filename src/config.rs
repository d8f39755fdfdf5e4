use crate::column_keys::ColumnKeySpec;
use crate::error::{Error, Result};
use std::fmt;
use std::time;

/// Default values for the encryption, decryption and rotation configurations
pub const DEFAULT_ENCRYPTION_ALGORITHM: EncryptionAlgorithm = EncryptionAlgorithm::AesGcmV1;
pub const DEFAULT_PLAINTEXT_FOOTER: bool = false;
pub const DEFAULT_DOUBLE_WRAPPING: bool = true;
pub const DEFAULT_CACHE_LIFETIME: time::Duration = time::Duration::from_secs(600); // 10 minutes
pub const DEFAULT_INTERNAL_KEY_MATERIAL: bool = true;
pub const DEFAULT_UNIFORM_ENCRYPTION: bool = false;
pub const DEFAULT_DATA_KEY_LENGTH_BITS: u32 = 128;

/// Data key lengths accepted for generated DEKs
pub const ACCEPTABLE_DATA_KEY_LENGTHS: [u32; 3] = [128, 192, 256];

/// Cipher used by the container writer for the file content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    /// AES-GCM for every module of the file
    #[default]
    AesGcmV1,
    /// AES-GCM for metadata, AES-CTR for page data
    AesGcmCtrV1,
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionAlgorithm::AesGcmV1 => write!(f, "AES_GCM_V1"),
            EncryptionAlgorithm::AesGcmCtrV1 => write!(f, "AES_GCM_CTR_V1"),
        }
    }
}

/// High level description of how a file should be encrypted
#[derive(Debug, Clone)]
pub struct EncryptionConfiguration {
    /// ID of the master key for footer encryption/signing
    pub footer_key: String,

    /// Columns to encrypt with their master key IDs.
    /// Format: "masterKeyID:colName,colName;masterKeyID:colName..."
    pub column_keys: String,

    /// Encrypt the footer and all columns with the same key
    pub uniform_encryption: bool,

    /// Cipher handed to the container writer
    pub encryption_algorithm: EncryptionAlgorithm,

    /// Write files with a plaintext footer
    pub plaintext_footer: bool,

    /// Wrap DEKs with locally generated KEKs, which in turn are wrapped by master keys.
    /// When false DEKs are wrapped directly by master keys.
    pub double_wrapping: bool,

    /// Lifetime of cached KMS clients and key encryption keys
    pub cache_lifetime: time::Duration,

    /// Store key material inside the file footer. When false key material is written
    /// to a sidecar document next to the file, which enables master key rotation.
    pub internal_key_material: bool,

    /// Length of generated data encryption keys, in bits
    pub data_key_length_bits: u32,
}

impl EncryptionConfiguration {
    /// Creates a configuration for the given footer master key with default settings
    pub fn new(footer_key: impl Into<String>) -> Self {
        Self {
            footer_key: footer_key.into(),
            column_keys: String::new(),
            uniform_encryption: DEFAULT_UNIFORM_ENCRYPTION,
            encryption_algorithm: DEFAULT_ENCRYPTION_ALGORITHM,
            plaintext_footer: DEFAULT_PLAINTEXT_FOOTER,
            double_wrapping: DEFAULT_DOUBLE_WRAPPING,
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
            internal_key_material: DEFAULT_INTERNAL_KEY_MATERIAL,
            data_key_length_bits: DEFAULT_DATA_KEY_LENGTH_BITS,
        }
    }

    /// Sets the column key specification
    ///
    /// # Example
    /// ```
    /// use fileencryption::config::EncryptionConfiguration;
    ///
    /// let config = EncryptionConfiguration::new("kf")
    ///     .with_column_keys("kc1:ssn,address;kc2:salary");
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn with_column_keys(mut self, column_keys: impl Into<String>) -> Self {
        self.column_keys = column_keys.into();
        self
    }

    /// Encrypts all columns with the footer key
    pub fn with_uniform_encryption(mut self) -> Self {
        self.uniform_encryption = true;
        self
    }

    /// Sets the encryption algorithm
    pub fn with_encryption_algorithm(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.encryption_algorithm = algorithm;
        self
    }

    /// Sets whether the footer is written in plaintext
    pub fn with_plaintext_footer(mut self, plaintext_footer: bool) -> Self {
        self.plaintext_footer = plaintext_footer;
        self
    }

    /// Sets single or double wrapping
    pub fn with_double_wrapping(mut self, double_wrapping: bool) -> Self {
        self.double_wrapping = double_wrapping;
        self
    }

    /// Sets the cache lifetime
    pub fn with_cache_lifetime(mut self, lifetime: time::Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    /// Sets whether key material is stored in the footer or in a sidecar document
    pub fn with_internal_key_material(mut self, internal: bool) -> Self {
        self.internal_key_material = internal;
        self
    }

    /// Sets the DEK length in bits
    pub fn with_data_key_length_bits(mut self, bits: u32) -> Self {
        self.data_key_length_bits = bits;
        self
    }

    /// Length of generated DEKs in bytes
    pub fn data_key_length_bytes(&self) -> usize {
        (self.data_key_length_bits / 8) as usize
    }

    /// Checks the configuration for contradictions and returns the parsed column keys.
    ///
    /// Returns `None` for uniform encryption.
    pub fn validate(&self) -> Result<Option<ColumnKeySpec>> {
        if self.footer_key.trim().is_empty() {
            return Err(Error::Configuration("footer key is not set".into()));
        }

        if !ACCEPTABLE_DATA_KEY_LENGTHS.contains(&self.data_key_length_bits) {
            return Err(Error::Configuration(format!(
                "wrong data key length: {} (must be one of 128, 192, 256)",
                self.data_key_length_bits
            )));
        }

        let has_column_keys = !self.column_keys.trim().is_empty();
        match (has_column_keys, self.uniform_encryption) {
            (true, true) => Err(Error::Configuration(
                "cannot set both column keys and uniform encryption".into(),
            )),
            (false, false) => Err(Error::Configuration(
                "either column keys or uniform encryption must be set".into(),
            )),
            (false, true) => Ok(None),
            (true, false) => ColumnKeySpec::parse(&self.column_keys).map(Some),
        }
    }
}

/// Configuration for reading encrypted files.
///
/// Everything else is recovered from the stored key metadata.
#[derive(Debug, Clone)]
pub struct DecryptionConfiguration {
    /// Lifetime of cached KMS clients and key encryption keys
    pub cache_lifetime: time::Duration,
}

impl Default for DecryptionConfiguration {
    fn default() -> Self {
        Self {
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
        }
    }
}

impl DecryptionConfiguration {
    /// Creates a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache lifetime
    pub fn with_cache_lifetime(mut self, lifetime: time::Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }
}

/// Settings for a master key rotation
#[derive(Debug, Clone)]
pub struct RotationConfiguration {
    /// Wrapping mode the caller expects the file to use. The stored key material
    /// is authoritative; a mismatch is logged.
    pub double_wrapping: bool,

    /// Lifetime of KMS clients cached during the rotation
    pub cache_lifetime: time::Duration,
}

impl Default for RotationConfiguration {
    fn default() -> Self {
        Self {
            double_wrapping: DEFAULT_DOUBLE_WRAPPING,
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
        }
    }
}

impl RotationConfiguration {
    /// Creates a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected wrapping mode
    pub fn with_double_wrapping(mut self, double_wrapping: bool) -> Self {
        self.double_wrapping = double_wrapping;
        self
    }

    /// Sets the cache lifetime
    pub fn with_cache_lifetime(mut self, lifetime: time::Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }
}
