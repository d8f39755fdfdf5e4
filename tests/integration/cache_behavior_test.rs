// Tests to verify cache behaviors under different configurations

use crate::integration::common::{create_factory, COLUMN_KEYS, FOOTER_KEY};
use fileencryption::config::{DecryptionConfiguration, EncryptionConfiguration};
use fileencryption::{CryptoFactory, FileEncryptionProperties, KmsConnectionConfig};
use std::time::Duration;

const LIFETIME: Duration = Duration::from_secs(600);

fn config(double_wrapping: bool) -> EncryptionConfiguration {
    EncryptionConfiguration::new(FOOTER_KEY)
        .with_column_keys(COLUMN_KEYS)
        .with_double_wrapping(double_wrapping)
        .with_cache_lifetime(LIFETIME)
}

async fn encrypt(
    factory: &CryptoFactory,
    connection: &KmsConnectionConfig,
    config: &EncryptionConfiguration,
) -> FileEncryptionProperties {
    factory
        .file_encryption_properties(connection, config, None, None)
        .await
        .expect("Failed to create encryption properties")
}

async fn decrypt_all(
    factory: &CryptoFactory,
    connection: &KmsConnectionConfig,
    encryption: &FileEncryptionProperties,
) {
    let decryption = factory
        .file_decryption_properties(
            connection,
            DecryptionConfiguration::new().with_cache_lifetime(LIFETIME),
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
        assert_eq!(&key, column.key());
    }
}

#[tokio::test(start_paused = true)]
async fn test_kek_and_client_lifetime() {
    let (factory, kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let config = config(true);

    // One client, one KEK per master key (kf, kc1, kc2)
    encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (1, 3, 0));

    kms.reset_counts();
    tokio::time::advance(LIFETIME - Duration::from_secs(1)).await;
    encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (0, 0, 0));

    // t0 + lifetime + 1s
    kms.reset_counts();
    tokio::time::advance(Duration::from_secs(2)).await;
    encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (1, 3, 0));

    kms.reset_counts();
    encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_single_wrapping_calls_kms_per_key() {
    let (factory, kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let config = config(false);

    // Footer plus one key per column group
    let encryption = encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (1, 3, 0));

    kms.reset_counts();
    encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (0, 3, 0));

    // ssn and address share a key but each column resolves its own
    kms.reset_counts();
    decrypt_all(&factory, &connection, &encryption).await;
    assert_eq!(kms.get_counts(), (0, 0, 4));
}

#[tokio::test]
async fn test_kek_read_cache_shared_across_files() {
    let (factory, kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let config = config(true);

    let first = encrypt(&factory, &connection, &config).await;
    let second = encrypt(&factory, &connection, &config).await;
    assert_ne!(first.footer_key(), second.footer_key());

    kms.reset_counts();
    decrypt_all(&factory, &connection, &first).await;
    assert_eq!(kms.get_counts(), (0, 0, 3));

    // Same KEKs, different DEKs
    kms.reset_counts();
    decrypt_all(&factory, &connection, &second).await;
    assert_eq!(kms.get_counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_remove_cache_entries_for_token() {
    let (factory, kms) = create_factory();
    let alice = KmsConnectionConfig::new().with_key_access_token("alice");
    let bob = KmsConnectionConfig::new().with_key_access_token("bob");
    let config = config(true);

    encrypt(&factory, &alice, &config).await;
    encrypt(&factory, &bob, &config).await;
    assert_eq!(kms.get_counts(), (2, 6, 0));

    factory.remove_cache_entries_for_token("alice");

    // bob's entries are still served without new calls
    kms.reset_counts();
    encrypt(&factory, &bob, &config).await;
    assert_eq!(kms.get_counts(), (0, 0, 0));

    kms.reset_counts();
    encrypt(&factory, &alice, &config).await;
    assert_eq!(kms.get_counts(), (1, 3, 0));

    factory.remove_cache_entries_for_all_tokens();
    kms.reset_counts();
    encrypt(&factory, &alice, &config).await;
    encrypt(&factory, &bob, &config).await;
    assert_eq!(kms.get_counts(), (2, 6, 0));
}

#[tokio::test]
async fn test_refreshed_token_gets_new_entries() {
    let (factory, kms) = create_factory();
    let connection = KmsConnectionConfig::new().with_key_access_token("v1");
    let config = config(true);

    encrypt(&factory, &connection, &config).await;

    kms.reset_counts();
    connection.refresh_key_access_token("v2");
    encrypt(&factory, &connection, &config).await;
    assert_eq!(kms.get_counts(), (1, 3, 0));
}

#[tokio::test]
async fn test_resolved_keys_survive_cache_removal() {
    let (factory, kms) = create_factory();
    let connection = KmsConnectionConfig::new();
    let encryption = encrypt(&factory, &connection, &config(true)).await;

    let decryption = factory
        .file_decryption_properties(&connection, DecryptionConfiguration::default(), None, None)
        .await
        .expect("Failed to create decryption properties");
    let footer_key = decryption
        .footer_key(encryption.footer_key_metadata())
        .await
        .expect("Failed to resolve footer key");

    factory.remove_cache_entries_for_all_tokens();

    kms.reset_counts();
    let again = decryption
        .footer_key(encryption.footer_key_metadata())
        .await
        .expect("Failed to resolve footer key");
    assert_eq!(footer_key, again);
    assert_eq!(kms.get_counts(), (0, 0, 0));
}
