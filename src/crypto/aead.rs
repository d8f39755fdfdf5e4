// Constants for GCM mode
pub(crate) const GCM_NONCE_SIZE: usize = 12;
pub(crate) const GCM_TAG_SIZE: usize = 16;

/// AES key sizes in bytes accepted by the GCM implementation
pub(crate) const AES_KEY_SIZES: [usize; 3] = [16, 24, 32];
