//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Passphrase has the wrong length
    #[error("passphrase must be exactly {expected} characters, got {actual}")]
    PassphraseLength {
        /// Required length
        expected: usize,
        /// Length of the rejected input
        actual: usize,
    },

    /// Passphrase contains a character outside the transfer alphabet
    #[error("passphrase contains invalid character {0:?}")]
    PassphraseCharacter(char),
}
