//! # Carpet Wire
//!
//! The Flying Carpet wire codec: every file crosses the link as one file
//! frame, and both peers walk the stream strictly in order.
//!
//! ## File frame
//!
//! All integers little-endian:
//!
//! ```text
//! u64              file_size
//! u64              filename_len
//! filename_len     filename (UTF-8, basename only)
//! repeated chunk records until file_size plaintext bytes are consumed
//! 32 bytes         SHA-256 of the plaintext
//!
//! Chunk record:
//! u64              ciphertext_len (tag included)
//! 12 bytes         nonce
//! ciphertext_len   ciphertext
//! ```
//!
//! There is no handshake, version field, or magic number: the first bytes
//! on an established connection are the u64 file count written by the
//! sender, and the peers authenticate each other implicitly by being able
//! to decrypt the first chunk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;

pub use codec::{recv_file, send_file};
pub use error::CodecError;

/// Plaintext chunk size (1 MiB)
pub const CHUNK_SIZE: usize = 1 << 20;

/// Upper bound on the filename length field
pub const MAX_FILENAME_LEN: u64 = 1024;
