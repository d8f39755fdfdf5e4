// End to end tests for encryption and decryption properties

use crate::integration::common::{
    create_factory, CountingKms, COLUMN_KEYS, FOOTER_KEY, ORIGINAL_DATA,
};
use fileencryption::config::{DecryptionConfiguration, EncryptionConfiguration};
use fileencryption::crypto::AesGcmAead;
use fileencryption::fs::{InMemoryFileSystem, LocalFileSystem};
use fileencryption::material::sidecar_path;
use fileencryption::{Aead, CryptoFactory, Error, FileSystem, KmsConnectionConfig};
use std::path::Path;
use std::sync::Arc;

#[tokio::test]
async fn test_round_trip_all_modes_and_key_lengths() {
    let (factory, _kms) = create_factory();
    let connection = KmsConnectionConfig::new();

    for double_wrapping in [true, false] {
        for bits in [128, 192, 256] {
            let config = EncryptionConfiguration::new(FOOTER_KEY)
                .with_column_keys(COLUMN_KEYS)
                .with_double_wrapping(double_wrapping)
                .with_data_key_length_bits(bits);

            let encryption = factory
                .file_encryption_properties(&connection, &config, None, None)
                .await
                .expect("Failed to create encryption properties");
            assert_eq!(encryption.footer_key().len(), bits as usize / 8);

            let decryption = factory
                .file_decryption_properties(
                    &connection,
                    DecryptionConfiguration::default(),
                    None,
                    None,
                )
                .await
                .expect("Failed to create decryption properties");

            let footer_key = decryption
                .footer_key(encryption.footer_key_metadata())
                .await
                .expect("Failed to resolve footer key");
            assert_eq!(&footer_key, encryption.footer_key());

            for (column_path, column) in encryption.column_keys() {
                let key = decryption
                    .column_key(column_path, column.key_metadata())
                    .await
                    .expect("Failed to resolve column key");
                assert_eq!(&key, column.key(), "column {}", column_path);
            }
        }
    }
}

#[tokio::test]
async fn test_column_payload_decrypts_with_resolved_key() {
    let (factory, _kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let config = EncryptionConfiguration::new(FOOTER_KEY).with_column_keys(COLUMN_KEYS);
    let aead = AesGcmAead::new();

    let encryption = factory
        .file_encryption_properties(&connection, &config, None, None)
        .await
        .expect("Failed to create encryption properties");
    let column = encryption
        .column_properties("salary")
        .expect("salary should be encrypted");
    let payload = aead
        .encrypt(ORIGINAL_DATA.as_bytes(), column.key().as_bytes(), b"salary")
        .expect("Failed to encrypt payload");

    // A separate factory has no cached KEKs
    let reader = CryptoFactory::new();
    reader.register_kms_client_factory(Arc::new(CountingKms::new()));
    let decryption = reader
        .file_decryption_properties(&connection, DecryptionConfiguration::default(), None, None)
        .await
        .expect("Failed to create decryption properties");
    let key = decryption
        .column_key("salary", column.key_metadata())
        .await
        .expect("Failed to resolve column key");

    let decrypted = aead
        .decrypt(&payload, key.as_bytes(), b"salary")
        .expect("Failed to decrypt payload");
    assert_eq!(decrypted, ORIGINAL_DATA.as_bytes());
}

#[tokio::test]
async fn test_invalid_configurations() {
    let (factory, _kms) = create_factory();
    let connection = KmsConnectionConfig::new();

    let configs = [
        // Both column keys and uniform encryption
        EncryptionConfiguration::new(FOOTER_KEY)
            .with_column_keys(COLUMN_KEYS)
            .with_uniform_encryption(),
        // Neither
        EncryptionConfiguration::new(FOOTER_KEY),
        EncryptionConfiguration::new(FOOTER_KEY)
            .with_column_keys(COLUMN_KEYS)
            .with_data_key_length_bits(64),
        EncryptionConfiguration::new(FOOTER_KEY).with_column_keys("kc1:a;kc2:a"),
        EncryptionConfiguration::new(FOOTER_KEY).with_column_keys("kc1:"),
        EncryptionConfiguration::new("").with_uniform_encryption(),
    ];

    for config in &configs {
        let result = factory
            .file_encryption_properties(&connection, config, None, None)
            .await;
        assert!(
            matches!(result, Err(Error::Configuration(_))),
            "expected configuration error for {:?}",
            config
        );
    }
}

#[tokio::test]
async fn test_no_factory_registered() {
    let factory = CryptoFactory::new();
    let config = EncryptionConfiguration::new(FOOTER_KEY).with_uniform_encryption();

    let result = factory
        .file_encryption_properties(&KmsConnectionConfig::new(), &config, None, None)
        .await;
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn test_external_key_material_on_local_disk() {
    let (factory, _kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("part-0.parquet");
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());

    let config = EncryptionConfiguration::new(FOOTER_KEY)
        .with_column_keys(COLUMN_KEYS)
        .with_internal_key_material(false);

    // External material needs both a path and a file system
    let result = factory
        .file_encryption_properties(&connection, &config, None, Some(fs.clone()))
        .await;
    assert!(matches!(result, Err(Error::Configuration(_))));

    let encryption = factory
        .file_encryption_properties(&connection, &config, Some(&path), Some(fs.clone()))
        .await
        .expect("Failed to create encryption properties");

    let expected = dir.path().join("_KEY_MATERIAL_FOR_part-0.parquet.json");
    assert_eq!(sidecar_path(&path).expect("Invalid path"), expected);
    let document = fs
        .read_file(&expected)
        .await
        .expect("Failed to read sidecar")
        .expect("Sidecar should exist");
    let document: serde_json::Value =
        serde_json::from_slice(&document).expect("Sidecar should be JSON");
    for reference in ["footerKey", "columnKey1", "columnKey2"] {
        assert!(document.get(reference).is_some(), "missing {}", reference);
    }

    let decryption = factory
        .file_decryption_properties(
            &connection,
            DecryptionConfiguration::default(),
            Some(&path),
            Some(fs),
        )
        .await
        .expect("Failed to create decryption properties");
    let footer_key = decryption
        .footer_key(encryption.footer_key_metadata())
        .await
        .expect("Failed to resolve footer key");
    assert_eq!(&footer_key, encryption.footer_key());
    let ssn = &encryption.column_keys()["ssn"];
    let key = decryption
        .column_key("ssn", ssn.key_metadata())
        .await
        .expect("Failed to resolve column key");
    assert_eq!(&key, ssn.key());
}

#[tokio::test]
async fn test_external_key_material_without_file_system() {
    let (factory, _kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let fs = Arc::new(InMemoryFileSystem::new());
    let path = Path::new("/warehouse/t/f.parquet");

    let config = EncryptionConfiguration::new(FOOTER_KEY)
        .with_uniform_encryption()
        .with_internal_key_material(false);
    let encryption = factory
        .file_encryption_properties(&connection, &config, Some(path), Some(fs.clone()))
        .await
        .expect("Failed to create encryption properties");

    // Only one of path and file system
    let result = factory
        .file_decryption_properties(
            &connection,
            DecryptionConfiguration::default(),
            Some(path),
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::Configuration(_))));

    // Neither: the failure surfaces once the external reference is resolved
    let decryption = factory
        .file_decryption_properties(&connection, DecryptionConfiguration::default(), None, None)
        .await
        .expect("Failed to create decryption properties");
    let result = decryption.footer_key(encryption.footer_key_metadata()).await;
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn test_kms_failure_reports_operation_and_master_key() {
    let (factory, kms) = create_factory();
    let config = EncryptionConfiguration::new(FOOTER_KEY)
        .with_column_keys(COLUMN_KEYS)
        .with_double_wrapping(false);

    kms.set_fail_wrap(true);
    let err = factory
        .file_encryption_properties(&KmsConnectionConfig::new(), &config, None, None)
        .await
        .expect_err("wrap should fail");

    assert_eq!(
        err.to_string(),
        "KMS wrap failed for master key 'kf': KMS service error: service unavailable"
    );
}

#[tokio::test]
async fn test_malformed_wrapped_dek_is_key_material_error() {
    let (factory, _kms) = create_factory();
    let connection = KmsConnectionConfig::new();

    for double_wrapping in [true, false] {
        let config = EncryptionConfiguration::new(FOOTER_KEY)
            .with_uniform_encryption()
            .with_double_wrapping(double_wrapping);
        let encryption = factory
            .file_encryption_properties(&connection, &config, None, None)
            .await
            .expect("Failed to create encryption properties");

        let mut metadata: serde_json::Value =
            serde_json::from_slice(encryption.footer_key_metadata()).expect("Invalid metadata");
        metadata["wrappedDEK"] = serde_json::Value::from("!!not base64!!");
        let metadata = serde_json::to_vec(&metadata).expect("Failed to serialize metadata");

        let decryption = factory
            .file_decryption_properties(&connection, DecryptionConfiguration::default(), None, None)
            .await
            .expect("Failed to create decryption properties");
        let result = decryption.footer_key(&metadata).await;
        assert!(
            matches!(result, Err(Error::KeyMaterial(_))),
            "unexpected result: {:?}",
            result
        );
    }
}
