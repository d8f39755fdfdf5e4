// Module for common test utilities and fixtures used across integration tests

use async_trait::async_trait;
use fileencryption::kms::InMemoryKms;
use fileencryption::{CryptoFactory, Error, KmsClient, KmsClientFactory, KmsConnectionConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// Master keys for tests
pub const FOOTER_KEY: &str = "kf";
pub const COLUMN_KEY_1: &str = "kc1";
pub const COLUMN_KEY_2: &str = "kc2";
pub const COLUMN_KEYS: &str = "kc1:ssn,address;kc2:salary";
pub const FOOTER_MASTER_KEY: &str = "000102030405060708090a0b0c0d0e0f";
pub const COLUMN_MASTER_KEY_1: &str = "101112131415161718191a1b1c1d1e1f";
pub const COLUMN_MASTER_KEY_2: &str = "202122232425262728292a2b2c2d2e2f3031323334353637";

pub const ORIGINAL_DATA: &str = "somesupersecretstring!hjdkashfjkdashfd";

// A KMS wrapper that counts client constructions and wrap/unwrap calls
#[derive(Clone, Debug)]
pub struct CountingKms {
    pub inner: InMemoryKms,
    counts: Arc<CountsHandle>,
}

#[derive(Default, Debug)]
struct CountsHandle {
    created: AtomicUsize,
    wrap: AtomicUsize,
    unwrap: AtomicUsize,
    fail_wrap: AtomicBool,
}

impl CountingKms {
    pub fn new() -> Self {
        let inner = InMemoryKms::new();
        inner
            .add_master_key(
                FOOTER_KEY,
                hex::decode(FOOTER_MASTER_KEY).expect("Invalid hex key"),
            )
            .expect("Failed to add footer key");
        inner
            .add_master_key(
                COLUMN_KEY_1,
                hex::decode(COLUMN_MASTER_KEY_1).expect("Invalid hex key"),
            )
            .expect("Failed to add column key");
        inner
            .add_master_key(
                COLUMN_KEY_2,
                hex::decode(COLUMN_MASTER_KEY_2).expect("Invalid hex key"),
            )
            .expect("Failed to add column key");

        Self {
            inner,
            counts: Arc::new(CountsHandle::default()),
        }
    }

    // (created, wrap, unwrap)
    pub fn get_counts(&self) -> (usize, usize, usize) {
        (
            self.counts.created.load(Ordering::SeqCst),
            self.counts.wrap.load(Ordering::SeqCst),
            self.counts.unwrap.load(Ordering::SeqCst),
        )
    }

    pub fn reset_counts(&self) {
        self.counts.created.store(0, Ordering::SeqCst);
        self.counts.wrap.store(0, Ordering::SeqCst);
        self.counts.unwrap.store(0, Ordering::SeqCst);
    }

    pub fn set_fail_wrap(&self, fail: bool) {
        self.counts.fail_wrap.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KmsClient for CountingKms {
    async fn wrap_key(
        &self,
        key_bytes: &[u8],
        master_key_identifier: &str,
    ) -> Result<Vec<u8>, Error> {
        self.counts.wrap.fetch_add(1, Ordering::SeqCst);
        if self.counts.fail_wrap.load(Ordering::SeqCst) {
            return Err(Error::KmsService("service unavailable".into()));
        }
        self.inner.wrap_key(key_bytes, master_key_identifier).await
    }

    async fn unwrap_key(
        &self,
        wrapped_key: &[u8],
        master_key_identifier: &str,
    ) -> Result<Vec<u8>, Error> {
        self.counts.unwrap.fetch_add(1, Ordering::SeqCst);
        self.inner.unwrap_key(wrapped_key, master_key_identifier).await
    }
}

#[async_trait]
impl KmsClientFactory for CountingKms {
    async fn create_client(
        &self,
        _config: &KmsConnectionConfig,
    ) -> Result<Arc<dyn KmsClient>, Error> {
        self.counts.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

// Create a crypto factory backed by a counting KMS
pub fn create_factory() -> (CryptoFactory, CountingKms) {
    let kms = CountingKms::new();
    let factory = CryptoFactory::new();
    factory.register_kms_client_factory(Arc::new(kms.clone()));
    (factory, kms)
}
