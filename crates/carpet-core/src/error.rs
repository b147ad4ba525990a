//! Transfer error taxonomy.

use carpet_wifi::WifiError;
use carpet_wire::CodecError;
use std::io;
use thiserror::Error;

/// Everything a transfer can fail with.
///
/// Every variant surfaces to the engine driver, which reports it through
/// the progress sink and returns; teardown runs regardless of the
/// variant.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Invalid configuration or passphrase entry
    #[error("{0}")]
    Config(String),

    /// Local filesystem failure
    #[error("local file error: {0}")]
    LocalIo(#[source] io::Error),

    /// Wireless adapter failure
    #[error("wifi error: {0}")]
    Wifi(#[from] WifiError),

    /// TCP failure: dial timeout, accept failure, broken stream
    #[error("network error: {0}")]
    Network(String),

    /// Malformed frame or unauthenticated chunk
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Final plaintext hash mismatch
    #[error("file integrity check failed")]
    IntegrityFailure,

    /// Cooperative cancellation observed
    #[error("transfer cancelled")]
    Cancelled,
}

impl From<CodecError> for TransferError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::File(err) => TransferError::LocalIo(err),
            CodecError::Stream(err) => TransferError::Network(err.to_string()),
            CodecError::HashMismatch => TransferError::IntegrityFailure,
            CodecError::Cancelled => TransferError::Cancelled,
            malformed => TransferError::Protocol(malformed.to_string()),
        }
    }
}
