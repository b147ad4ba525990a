//! SSID and transfer key derivation.
//!
//! Both peers derive the network name and the symmetric key independently
//! from the shared passphrase, so the derivations here are fixed functions
//! of the passphrase bytes and nothing else.

use crate::{CryptoError, KEY_SIZE, SSID_PREFIX};
use argon2::{Algorithm, Argon2, Params, Version};
use md5::{Digest, Md5};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fixed salt for transfer key derivation.
///
/// Both sides must derive the key from the passphrase alone, so the salt
/// cannot be random.
const KEY_SALT: &[u8] = b"flyingCarpet/adhoc-link/v1";

/// Argon2id memory cost in KiB
const ARGON2_MEMORY_KIB: u32 = 19_456;

/// Argon2id iteration count
const ARGON2_ITERATIONS: u32 = 2;

/// Argon2id parallelism
const ARGON2_PARALLELISM: u32 = 1;

/// Symmetric transfer key with automatic zeroization.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TransferKey {
    key: [u8; KEY_SIZE],
}

impl TransferKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

/// Derive the ad-hoc network name from the passphrase.
///
/// `"flyingCarpet_"` followed by the first three bytes of the MD5 digest
/// of the passphrase, lowercase hex. Six hex digits keep the SSID short
/// while letting both sides agree on it without communicating.
#[must_use]
pub fn derive_ssid(passphrase: &str) -> String {
    let digest = Md5::digest(passphrase.as_bytes());
    format!("{SSID_PREFIX}{}", hex::encode(&digest[..3]))
}

/// Derive the WPA2 pre-shared key for the ad-hoc network.
///
/// The full MD5 digest of the passphrase in lowercase hex: 32 characters,
/// which satisfies the 8..=63 length WPA2 requires where the 4-character
/// passphrase itself would not. Both sides derive it independently, like
/// the SSID.
#[must_use]
pub fn derive_network_psk(passphrase: &str) -> String {
    hex::encode(Md5::digest(passphrase.as_bytes()))
}

/// Derive the 32-byte transfer key from the passphrase.
///
/// Argon2id v0x13 with fixed parameters (19456 KiB, t=2, p=1) and the
/// fixed [`KEY_SALT`]. Both sides must compute this identically; the
/// parameters are part of the wire contract.
///
/// # Errors
///
/// Returns an error if the Argon2 computation fails.
pub fn derive_key(passphrase: &str) -> Result<TransferKey, CryptoError> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(KEY_SIZE),
    )
    .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.as_bytes(), KEY_SALT, &mut key)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    Ok(TransferKey::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passphrase::generate_passphrase;

    #[test]
    fn test_ssid_known_vector() {
        // MD5("abcd") = e2fc714c4727ee9395f324cd2e7f331f
        assert_eq!(derive_ssid("abcd"), "flyingCarpet_e2fc71");
    }

    #[test]
    fn test_ssid_empty_passphrase_vector() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(derive_ssid(""), "flyingCarpet_d41d8c");
    }

    #[test]
    fn test_ssid_shape() {
        for _ in 0..50 {
            let ssid = derive_ssid(&generate_passphrase());
            let suffix = ssid.strip_prefix("flyingCarpet_").unwrap();
            assert_eq!(suffix.len(), 6);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(suffix, suffix.to_lowercase());
        }
    }

    #[test]
    fn test_network_psk_known_vector() {
        assert_eq!(
            derive_network_psk("abcd"),
            "e2fc714c4727ee9395f324cd2e7f331f"
        );
    }

    #[test]
    fn test_network_psk_is_wpa2_sized() {
        for _ in 0..20 {
            let psk = derive_network_psk(&generate_passphrase());
            assert_eq!(psk.len(), 32);
            assert!((8..=63).contains(&psk.len()));
        }
    }

    #[test]
    fn test_network_psk_shares_prefix_with_ssid() {
        let psk = derive_network_psk("abcd");
        let ssid = derive_ssid("abcd");
        assert!(ssid.ends_with(&psk[..6]));
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = derive_key("abcd").unwrap();
        let b = derive_key("abcd").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_key_differs_per_passphrase() {
        let a = derive_key("aaaa").unwrap();
        let b = derive_key("bbbb").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_key_is_not_all_zero() {
        let key = derive_key("abcd").unwrap();
        assert_ne!(key.as_bytes(), &[0u8; KEY_SIZE]);
    }
}
