//! Local cryptographic primitives used to wrap keys

mod aead;
pub mod aes_gcm;

pub use self::aes_gcm::AesGcmAead;
