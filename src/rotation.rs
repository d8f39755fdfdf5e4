//! Master key rotation for files with external key material
//!
//! Every key in the sidecar document is unwrapped with the master key version that
//! wrapped it and rewrapped with the latest version. Single wrapped DEKs are
//! rewrapped directly; under double wrapping the KEKs are rewrapped and the locally
//! wrapped DEKs are kept as they are. The DEKs never change, so the encrypted file
//! does not need to be rewritten.

use crate::config::RotationConfiguration;
use crate::envelope::{kms_unwrap, kms_wrap};
use crate::error::{Error, Result};
use crate::key::toolkit::KeyToolkit;
use crate::kms::KmsConnectionConfig;
use crate::material::{sidecar_path, FileKeyMaterialStore, FOOTER_KEY_REFERENCE};
use crate::FileSystem;
use metrics::counter;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub(crate) async fn rotate_master_keys(
    toolkit: &KeyToolkit,
    connection: &KmsConnectionConfig,
    file_path: &Path,
    fs: Arc<dyn FileSystem>,
    config: &RotationConfiguration,
) -> Result<()> {
    let lock = toolkit.rotation_lock(&sidecar_path(file_path)?);
    let _guard = lock.lock().await;

    let mut store = FileKeyMaterialStore::load(file_path, fs)
        .await?
        .ok_or_else(|| {
            Error::Configuration(format!(
                "{} has no external key material to rotate",
                file_path.display()
            ))
        })?;

    toolkit.clean_kek_write_cache_for_rotation();

    let footer = store.key_material(FOOTER_KEY_REFERENCE)?;
    let connection = connection.resolved(
        footer.kms_instance_id.as_deref(),
        footer.kms_instance_url.as_deref(),
    );
    let client = toolkit.kms_client(&connection, config.cache_lifetime).await?;

    // KEK ID -> rewrapped KEK, so a KEK shared by several keys is rotated once
    let mut rotated_keks: HashMap<String, String> = HashMap::new();
    let mut mode_mismatch_logged = false;

    for key_reference in store.key_references() {
        let mut material = store.key_material(&key_reference)?;

        if material.double_wrapping != config.double_wrapping && !mode_mismatch_logged {
            log::warn!(
                "{}: key material is {} wrapped, rotating it as stored",
                file_path.display(),
                if material.double_wrapping { "double" } else { "single" }
            );
            mode_mismatch_logged = true;
        }

        if material.double_wrapping {
            let (kek_id, wrapped_kek) = material.kek()?;
            let rewrapped = match rotated_keks.get(kek_id) {
                Some(rewrapped) => rewrapped.clone(),
                None => {
                    let kek = kms_unwrap(&*client, wrapped_kek, &material.master_key_id).await?;
                    let rewrapped = kms_wrap(&*client, &kek, &material.master_key_id).await?;
                    rotated_keks.insert(kek_id.to_string(), rewrapped.clone());
                    rewrapped
                }
            };
            material.wrapped_kek = Some(rewrapped);
        } else {
            let dek = kms_unwrap(&*client, &material.wrapped_dek, &material.master_key_id).await?;
            material.wrapped_dek = kms_wrap(&*client, &dek, &material.master_key_id).await?;
        }

        store.add_key_material(&key_reference, &material)?;
    }

    store.save().await?;

    counter!("fileencryption.rotation", 1);
    log::debug!("rotated master keys of {}", file_path.display());
    Ok(())
}
