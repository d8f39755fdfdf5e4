//! Key buffers and key caching for the fileencryption library

pub mod cache;
pub mod toolkit;

use crate::util::{fill_random, get_rand_bytes};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Size of generated key encryption keys in bytes
pub const KEK_LENGTH: usize = 16;

/// Size of generated key encryption key IDs in bytes
pub const KEK_ID_LENGTH: usize = 16;

/// Plaintext key bytes (DEK or KEK).
///
/// The buffer is zeroed when the last clone is dropped. Clones are independent
/// copies, so a cached key can be handed out and used after the cache entry is gone.
#[derive(Clone)]
pub struct KeyBytes(Zeroizing<Vec<u8>>);

impl KeyBytes {
    /// Takes ownership of the given bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Generates a new random key of the specified size
    pub fn generate(size: usize) -> Self {
        let mut bytes = Zeroizing::new(vec![0_u8; size]);
        fill_random(&mut bytes);
        Self(bytes)
    }

    /// Returns the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for an empty key
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for KeyBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for KeyBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for KeyBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for KeyBytes {}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyBytes(<{} bytes hidden>)", self.len())
    }
}

/// A locally generated key encryption key and its master-key-wrapped form
#[derive(Clone)]
pub struct KeyEncryptionKey {
    master_key_id: String,
    id: Vec<u8>,
    encoded_id: String,
    bytes: KeyBytes,
    encoded_wrapped_key: String,
}

impl KeyEncryptionKey {
    /// Creates a KEK from its parts
    pub fn new(
        master_key_id: impl Into<String>,
        id: Vec<u8>,
        encoded_id: String,
        bytes: KeyBytes,
        encoded_wrapped_key: String,
    ) -> Self {
        Self {
            master_key_id: master_key_id.into(),
            id,
            encoded_id,
            bytes,
            encoded_wrapped_key,
        }
    }

    /// Generates random KEK bytes and a random KEK ID
    pub fn generate_parts() -> (KeyBytes, Vec<u8>) {
        (KeyBytes::generate(KEK_LENGTH), get_rand_bytes(KEK_ID_LENGTH))
    }

    /// Master key that wraps this KEK
    pub fn master_key_id(&self) -> &str {
        &self.master_key_id
    }

    /// Raw KEK ID, used as AAD when wrapping DEKs
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Base64 KEK ID as stored in key material
    pub fn encoded_id(&self) -> &str {
        &self.encoded_id
    }

    /// Plaintext KEK
    pub fn bytes(&self) -> &KeyBytes {
        &self.bytes
    }

    /// Base64 KEK wrapped by the master key
    pub fn encoded_wrapped_key(&self) -> &str {
        &self.encoded_wrapped_key
    }
}

impl fmt::Debug for KeyEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEncryptionKey")
            .field("master_key_id", &self.master_key_id)
            .field("encoded_id", &self.encoded_id)
            .field("bytes", &"<hidden>")
            .finish()
    }
}
