//! # Carpet Crypto
//!
//! Cryptographic primitives for Flying Carpet.
//!
//! This crate provides:
//! - One-time transfer passphrase generation and validation
//! - SSID derivation (both peers compute the network name from the passphrase)
//! - Transfer key derivation (Argon2id over the passphrase)
//! - `ChaCha20-Poly1305` chunk encryption with deterministic counter nonces
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | AEAD | ChaCha20-Poly1305 (256-bit key, 96-bit nonce) |
//! | KDF | Argon2id v0x13, m=19456 KiB, t=2, p=1 |
//! | SSID digest | MD5 (first 3 bytes, lowercase hex) |
//!
//! MD5 is used only to map a passphrase to a recognisable network name; it
//! carries no security weight. All confidentiality and authenticity comes
//! from the AEAD layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod derive;
pub mod error;
pub mod passphrase;

pub use aead::ChunkCipher;
pub use derive::{TransferKey, derive_key, derive_network_psk, derive_ssid};
pub use error::CryptoError;
pub use passphrase::{generate_passphrase, validate_passphrase};

/// Transfer key size in bytes
pub const KEY_SIZE: usize = 32;

/// AEAD nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// AEAD authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Length of a transfer passphrase in characters
pub const PASSPHRASE_LEN: usize = 4;

/// Prefix of every Flying Carpet network name
pub const SSID_PREFIX: &str = "flyingCarpet_";
