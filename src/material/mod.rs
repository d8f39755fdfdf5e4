//! Key material and key metadata documents
//!
//! Key material holds everything needed to recover a DEK: the master key ID, the
//! wrapped DEK and, for double wrapping, the KEK ID and wrapped KEK. Key metadata is
//! what the container stores next to each key: either the key material itself, or a
//! reference into the sidecar document managed by [`FileKeyMaterialStore`].

mod store;

pub use store::{sidecar_path, temp_sidecar_path, FileKeyMaterialStore};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Type tag written into every key material and key reference document
pub const KEY_MATERIAL_TYPE: &str = "PKMT1";

/// Key reference of the footer key in the sidecar document
pub const FOOTER_KEY_REFERENCE: &str = "footerKey";

/// Prefix of column key references in the sidecar document
pub const COLUMN_KEY_REFERENCE_PREFIX: &str = "columnKey";

/// Wrapped form of one DEK plus the data needed to unwrap it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub key_material_type: String,

    pub internal_storage: bool,

    pub is_footer_key: bool,

    /// Only recorded for the footer key
    #[serde(rename = "kmsInstanceID", default, skip_serializing_if = "Option::is_none")]
    pub kms_instance_id: Option<String>,

    /// Only recorded for the footer key
    #[serde(rename = "kmsInstanceURL", default, skip_serializing_if = "Option::is_none")]
    pub kms_instance_url: Option<String>,

    #[serde(rename = "masterKeyID")]
    pub master_key_id: String,

    /// Base64 DEK, wrapped by the master key or by the KEK
    #[serde(rename = "wrappedDEK")]
    pub wrapped_dek: String,

    pub double_wrapping: bool,

    /// Base64 KEK ID, double wrapping only
    #[serde(rename = "keyEncryptionKeyID", default, skip_serializing_if = "Option::is_none")]
    pub kek_id: Option<String>,

    /// Base64 KEK wrapped by the master key, double wrapping only
    #[serde(rename = "wrappedKEK", default, skip_serializing_if = "Option::is_none")]
    pub wrapped_kek: Option<String>,
}

impl KeyMaterial {
    /// Creates single wrapped key material
    pub fn new(
        is_footer_key: bool,
        internal_storage: bool,
        master_key_id: impl Into<String>,
        wrapped_dek: impl Into<String>,
    ) -> Self {
        Self {
            key_material_type: KEY_MATERIAL_TYPE.to_string(),
            internal_storage,
            is_footer_key,
            kms_instance_id: None,
            kms_instance_url: None,
            master_key_id: master_key_id.into(),
            wrapped_dek: wrapped_dek.into(),
            double_wrapping: false,
            kek_id: None,
            wrapped_kek: None,
        }
    }

    /// Records the KMS instance (footer key only)
    pub fn with_kms_instance(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.kms_instance_id = Some(id.into());
        self.kms_instance_url = Some(url.into());
        self
    }

    /// Marks the material as double wrapped with the given KEK
    pub fn with_kek(mut self, kek_id: impl Into<String>, wrapped_kek: impl Into<String>) -> Self {
        self.double_wrapping = true;
        self.kek_id = Some(kek_id.into());
        self.wrapped_kek = Some(wrapped_kek.into());
        self
    }

    /// Parses and checks a serialized key material document
    pub fn parse(json: &str) -> Result<Self> {
        let material: KeyMaterial = serde_json::from_str(json)
            .map_err(|e| Error::KeyMaterial(format!("failed to parse key material: {}", e)))?;
        material.check()?;
        Ok(material)
    }

    /// Serializes the key material to JSON
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// KEK ID and wrapped KEK of double wrapped material
    pub fn kek(&self) -> Result<(&str, &str)> {
        match (&self.kek_id, &self.wrapped_kek) {
            (Some(id), Some(wrapped)) => Ok((id, wrapped)),
            _ => Err(Error::KeyMaterial(format!(
                "double wrapped key material for master key '{}' has no KEK",
                self.master_key_id
            ))),
        }
    }

    fn check(&self) -> Result<()> {
        check_type(&self.key_material_type)?;
        if self.master_key_id.is_empty() {
            return Err(Error::KeyMaterial("key material has no master key ID".into()));
        }
        if self.double_wrapping {
            self.kek()?;
        }
        Ok(())
    }
}

fn check_type(key_material_type: &str) -> Result<()> {
    if key_material_type != KEY_MATERIAL_TYPE {
        return Err(Error::KeyMaterial(format!(
            "unsupported key material type: {}",
            key_material_type
        )));
    }
    Ok(())
}

/// Key metadata stored by the container for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMetadata {
    /// Key material embedded in the container
    Internal(KeyMaterial),

    /// Reference to key material in the sidecar document
    External { key_reference: String },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyMetadataHeader {
    key_material_type: String,
    internal_storage: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_reference: Option<String>,
}

impl KeyMetadata {
    /// Parses key metadata bytes read from the container
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let json = std::str::from_utf8(bytes)
            .map_err(|e| Error::KeyMaterial(format!("key metadata is not UTF-8: {}", e)))?;
        let header: KeyMetadataHeader = serde_json::from_str(json)
            .map_err(|e| Error::KeyMaterial(format!("failed to parse key metadata: {}", e)))?;
        check_type(&header.key_material_type)?;

        if header.internal_storage {
            return KeyMaterial::parse(json).map(KeyMetadata::Internal);
        }

        match header.key_reference {
            Some(key_reference) if !key_reference.is_empty() => {
                Ok(KeyMetadata::External { key_reference })
            }
            _ => Err(Error::KeyMaterial(
                "external key metadata has no key reference".into(),
            )),
        }
    }

    /// Serializes the key metadata for storage in the container
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            KeyMetadata::Internal(material) => Ok(material.serialize()?.into_bytes()),
            KeyMetadata::External { key_reference } => Ok(serde_json::to_vec(&KeyMetadataHeader {
                key_material_type: KEY_MATERIAL_TYPE.to_string(),
                internal_storage: false,
                key_reference: Some(key_reference.clone()),
            })?),
        }
    }
}
