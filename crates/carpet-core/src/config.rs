//! Transfer configuration and the host-or-join role policy.

use crate::progress::ProgressSink;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Operating system of a transfer endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// macOS
    Mac,
    /// Windows
    Windows,
    /// Linux
    Linux,
}

impl Os {
    /// The operating system this binary was built for.
    #[cfg(target_os = "macos")]
    pub const CURRENT: Os = Os::Mac;
    /// The operating system this binary was built for.
    #[cfg(target_os = "windows")]
    pub const CURRENT: Os = Os::Windows;
    /// The operating system this binary was built for.
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    pub const CURRENT: Os = Os::Linux;
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mac" => Ok(Os::Mac),
            "windows" => Ok(Os::Windows),
            "linux" => Ok(Os::Linux),
            other => Err(format!("unknown peer OS {other:?}, use linux, mac, or windows")),
        }
    }
}

/// What this endpoint is doing with the files
#[derive(Debug, Clone)]
pub enum Mode {
    /// Send the listed files, in order. Paths are absolute and final
    /// before any network action.
    Send(Vec<PathBuf>),
    /// Receive into this existing directory.
    Receive(PathBuf),
}

impl Mode {
    /// Direction of this endpoint.
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Mode::Send(_) => Direction::Send,
            Mode::Receive(_) => Direction::Receive,
        }
    }
}

/// Direction of a transfer endpoint, without the payload details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// This endpoint sends
    Send,
    /// This endpoint receives
    Receive,
}

/// Which side of the ad-hoc link this endpoint takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Bring the network up and wait for the peer
    Host,
    /// Join the network the peer brings up
    Join,
}

/// Decide who hosts the ad-hoc link.
///
/// Both peers evaluate this from the OS pair alone, so the policy must be
/// a pure function they agree on. Windows and Linux host when receiving;
/// so does a Mac facing another Mac. A Mac facing Windows or Linux hosts
/// when sending instead, because the desktop platforms cannot bring up a
/// network a Mac will reliably join.
#[must_use]
pub fn link_role(local: Os, peer: Os, direction: Direction) -> LinkRole {
    let host_when_sending = local == Os::Mac && peer != Os::Mac;
    match (direction, host_when_sending) {
        (Direction::Send, true) | (Direction::Receive, false) => LinkRole::Host,
        (Direction::Send, false) | (Direction::Receive, true) => LinkRole::Join,
    }
}

/// Stage deadlines, all defaulting to the reference 60 seconds
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// How long `join_adhoc` may retry association
    pub join: Duration,
    /// How long the dial loop may retry `connect`
    pub dial: Duration,
    /// How long peer IP discovery may poll
    pub peer_ip: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            join: Duration::from_secs(60),
            dial: Duration::from_secs(60),
            peer_ip: Duration::from_secs(60),
        }
    }
}

/// Everything a transfer needs, immutable once constructed
#[derive(Clone)]
pub struct TransferConfig {
    /// Sending or receiving, with the paths involved
    pub mode: Mode,
    /// Operating system of the other computer
    pub peer_os: Os,
    /// TCP port, identical on both ends
    pub port: u16,
    /// Stage deadlines
    pub timeouts: Timeouts,
    /// Where transfer narration and percentages go
    pub progress: Arc<dyn ProgressSink>,
    /// Cooperative cancellation token shared with the UI/signal task
    pub cancel: CancellationToken,
}
