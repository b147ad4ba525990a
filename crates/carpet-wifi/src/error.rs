//! Wireless control error types.

use std::io;
use thiserror::Error;

/// Failures reported by the OS wireless adapters
#[derive(Debug, Error)]
pub enum WifiError {
    /// Platform tool could not be launched
    #[error("could not run {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying launch error
        source: io::Error,
    },

    /// Platform tool ran and reported failure
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Trimmed stderr from the tool
        stderr: String,
    },

    /// No wireless interface present on this machine
    #[error("no wireless interface found")]
    NoInterface,

    /// Could not associate with the ad-hoc network before the deadline
    #[error("could not join {ssid} within {seconds} seconds")]
    JoinTimeout {
        /// Network we were trying to join
        ssid: String,
        /// Deadline that elapsed
        seconds: u64,
    },

    /// No peer appeared on the ad-hoc link before the deadline
    #[error("no peer found on the ad-hoc link within {seconds} seconds")]
    PeerNotFound {
        /// Deadline that elapsed
        seconds: u64,
    },
}
