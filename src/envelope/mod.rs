//! Envelope wrapping of data encryption keys
//!
//! DEKs are either wrapped directly by a master key in the KMS (single wrapping) or
//! wrapped locally by a cached key encryption key that is itself wrapped by the
//! master key (double wrapping).

pub mod unwrapper;
pub mod wrapper;

pub use unwrapper::KeyUnwrapper;
pub use wrapper::KeyWrapper;

use crate::error::{Error, KmsOperation, Result};
use crate::key::KeyBytes;
use crate::KmsClient;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use metrics::counter;

/// Wraps key bytes with the latest version of a master key and returns them base64 encoded
pub(crate) async fn kms_wrap(
    client: &dyn KmsClient,
    key: &KeyBytes,
    master_key_id: &str,
) -> Result<String> {
    counter!("fileencryption.kms.wrap", 1);
    let wrapped = client
        .wrap_key(key.as_bytes(), master_key_id)
        .await
        .map_err(|e| Error::kms(KmsOperation::Wrap, master_key_id, e))?;
    Ok(STANDARD.encode(wrapped))
}

/// Unwraps base64 encoded key bytes with the master key version that wrapped them
pub(crate) async fn kms_unwrap(
    client: &dyn KmsClient,
    encoded_wrapped_key: &str,
    master_key_id: &str,
) -> Result<KeyBytes> {
    let wrapped = decode(encoded_wrapped_key)?;
    counter!("fileencryption.kms.unwrap", 1);
    let key = client
        .unwrap_key(&wrapped, master_key_id)
        .await
        .map_err(|e| Error::kms(KmsOperation::Unwrap, master_key_id, e))?;
    Ok(KeyBytes::new(key))
}

pub(crate) fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a base64 field of stored key material
pub(crate) fn decode(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| Error::KeyMaterial(format!("invalid base64 in key material: {}", e)))
}
