//! Codec error types.

use carpet_crypto::CryptoError;
use std::io;
use thiserror::Error;

/// Errors produced while encoding or decoding a file frame.
///
/// Local file I/O and stream I/O are kept apart so the caller can report
/// a broken disk differently from a broken link.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Reading or writing the local file failed
    #[error("file error: {0}")]
    File(#[source] io::Error),

    /// Reading or writing the stream failed
    #[error("stream error: {0}")]
    Stream(#[source] io::Error),

    /// Filename length field out of bounds
    #[error("filename length {0} out of bounds")]
    FilenameLength(u64),

    /// Filename not representable or not a plain basename
    #[error("invalid filename: {0}")]
    Filename(String),

    /// Ciphertext length field out of bounds
    #[error("chunk length {0} out of bounds")]
    ChunkLength(u64),

    /// More plaintext arrived than the frame header declared
    #[error("chunk overruns declared file size {declared}")]
    Overrun {
        /// Size declared in the frame header
        declared: u64,
    },

    /// A zero-length chunk where plaintext was still owed
    #[error("empty chunk before end of file")]
    EmptyChunk,

    /// Chunk cipher failure (tampering or mismatched passphrase)
    #[error("chunk cipher failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Final plaintext hash did not match the sender's digest
    #[error("file hash mismatch")]
    HashMismatch,

    /// Cancellation observed mid-frame
    #[error("transfer cancelled")]
    Cancelled,
}
