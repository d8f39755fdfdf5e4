use crate::crypto::aead::{AES_KEY_SIZES, GCM_NONCE_SIZE, GCM_TAG_SIZE};
use crate::error::{Error, Result};
use crate::util::fill_random;
use crate::Aead;
use aes_gcm::{
    aead::{consts::U12, Aead as AeadTrait, AeadCore, KeyInit, Payload},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// AES-GCM implementation of AEAD, selecting AES-128/192/256 from the key length.
///
/// Output layout is `nonce || ciphertext || tag`.
#[derive(Default, Debug, Clone)]
pub struct AesGcmAead;

impl AesGcmAead {
    /// Creates a new instance of the AES-GCM AEAD implementation
    pub fn new() -> Self {
        Self
    }

    fn seal<C>(key: &[u8], nonce: &[u8], payload: Payload<'_, '_>) -> Result<Vec<u8>>
    where
        C: KeyInit + AeadTrait + AeadCore<NonceSize = U12>,
    {
        let cipher = C::new_from_slice(key)
            .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), payload)
            .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
    }

    fn open<C>(key: &[u8], nonce: &[u8], payload: Payload<'_, '_>) -> Result<Vec<u8>>
    where
        C: KeyInit + AeadTrait + AeadCore<NonceSize = U12>,
    {
        let cipher = C::new_from_slice(key)
            .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if AES_KEY_SIZES.contains(&key.len()) {
        Ok(())
    } else {
        Err(Error::Crypto(format!(
            "Unsupported AES key length: {} bytes",
            key.len()
        )))
    }
}

impl Aead for AesGcmAead {
    fn encrypt(&self, data: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        check_key(key)?;

        let mut nonce = [0_u8; GCM_NONCE_SIZE];
        fill_random(&mut nonce);
        let payload = Payload { msg: data, aad };

        let ciphertext = match key.len() {
            16 => Self::seal::<Aes128Gcm>(key, &nonce, payload)?,
            24 => Self::seal::<Aes192Gcm>(key, &nonce, payload)?,
            _ => Self::seal::<Aes256Gcm>(key, &nonce, payload)?,
        };

        let mut nonce_and_cipher = Vec::with_capacity(GCM_NONCE_SIZE + ciphertext.len());
        nonce_and_cipher.extend_from_slice(&nonce);
        nonce_and_cipher.extend_from_slice(&ciphertext);
        Ok(nonce_and_cipher)
    }

    fn decrypt(&self, data: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        check_key(key)?;

        if data.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
            // Must have at least nonce and tag
            return Err(Error::Crypto(
                "Data length is too short for GCM (nonce + tag)".into(),
            ));
        }

        let (nonce, ciphertext) = data.split_at(GCM_NONCE_SIZE);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        match key.len() {
            16 => Self::open::<Aes128Gcm>(key, nonce, payload),
            24 => Self::open::<Aes192Gcm>(key, nonce, payload),
            _ => Self::open::<Aes256Gcm>(key, nonce, payload),
        }
    }
}
