//! `ChaCha20-Poly1305` chunk encryption.
//!
//! Each file frame encrypts its chunks under the transfer key with a
//! deterministic 96-bit counter nonce, restarting at zero per frame as
//! the wire format fixes it.

use crate::{CryptoError, NONCE_SIZE, TransferKey};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};

/// AEAD cipher for chunk encryption
pub struct ChunkCipher {
    cipher: ChaCha20Poly1305,
}

impl ChunkCipher {
    /// Create a cipher from a transfer key
    #[must_use]
    pub fn new(key: &TransferKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt one plaintext chunk under the given counter.
    ///
    /// Returns the nonce that was used and the ciphertext with the 16-byte
    /// authentication tag appended. Associated data is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn seal(
        &self,
        counter: u64,
        plaintext: &[u8],
    ) -> Result<([u8; NONCE_SIZE], Vec<u8>), CryptoError> {
        let nonce = nonce_for(counter);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok((nonce, ciphertext))
    }

    /// Decrypt one chunk with the nonce read off the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, which covers both
    /// tampering and a mismatched passphrase on the two ends.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Build the 96-bit nonce for a chunk counter.
///
/// Little-endian counter in the low eight bytes, high four bytes zero.
#[must_use]
pub fn nonce_for(counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}
