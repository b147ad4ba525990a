//! # Carpet WiFi
//!
//! The wireless control capability Flying Carpet drives during a
//! transfer: snapshot the current network, bring up or join the ad-hoc
//! link, resolve the peer's address on it, and put the radio back the way
//! it was found.
//!
//! The transfer engine depends only on the [`WifiControl`] trait; the
//! per-OS adapters in this crate drive the platform tooling (`nmcli`,
//! `networksetup`/`airport`, `netsh wlan`) through `tokio::process`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::LinuxWifi as NativeWifi;
#[cfg(target_os = "macos")]
pub use macos::MacWifi as NativeWifi;
#[cfg(target_os = "windows")]
pub use windows::WindowsWifi as NativeWifi;

pub use error::WifiError;

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Opaque snapshot of the wireless state before Flying Carpet touched it.
///
/// Captured once per transfer and handed back to [`WifiControl::restore`]
/// on every exit path. The identifier inside is platform-specific (a
/// NetworkManager connection UUID, an SSID, a profile name) and only the
/// adapter that produced it interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkHandle {
    id: Option<String>,
}

impl NetworkHandle {
    /// Snapshot of "not associated with anything".
    #[must_use]
    pub fn none() -> Self {
        Self { id: None }
    }

    /// Snapshot wrapping a platform-specific network identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }

    /// The wrapped identifier, if the radio was associated at capture time.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Wireless control operations the transfer engine depends on.
///
/// Implementations may block for seconds at a time inside the OS tooling;
/// every operation that can wait takes an explicit deadline. `restore`
/// must be idempotent: the engine calls it unconditionally on every exit
/// path and a second invocation must be a no-op.
#[async_trait]
pub trait WifiControl: Send + Sync {
    /// Snapshot the currently associated network for later restoration.
    async fn current_network(&self) -> Result<NetworkHandle, WifiError>;

    /// Bring up an ad-hoc network with the given credentials.
    ///
    /// Returns once the network is advertised.
    async fn host_adhoc(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError>;

    /// Join the peer's ad-hoc network, retrying until `deadline` elapses.
    async fn join_adhoc(
        &self,
        ssid: &str,
        passphrase: &str,
        deadline: Duration,
    ) -> Result<(), WifiError>;

    /// Resolve the peer's address on the ad-hoc link.
    ///
    /// On the hosting side this waits for a client to associate and show
    /// up in the neighbour table; on the joining side it resolves the
    /// host's gateway address.
    async fn find_peer_ip(&self, deadline: Duration) -> Result<IpAddr, WifiError>;

    /// Return the radio to its pre-transfer state. Idempotent.
    async fn restore(&self, previous: &NetworkHandle) -> Result<(), WifiError>;
}

/// Which side of the ad-hoc link this adapter set up.
///
/// Recorded internally by the adapters so `find_peer_ip` and `restore`
/// know what to undo; never exposed to the engine.
#[derive(Debug, Clone)]
pub(crate) enum LinkState {
    /// We brought the network up and own the gateway address.
    Hosting {
        /// SSID of the network we advertised
        ssid: String,
    },
    /// We joined the peer's network.
    Joined {
        /// SSID of the network we associated with
        ssid: String,
    },
}

/// Run a platform command and capture stdout.
///
/// Non-zero exit status is an error carrying trimmed stderr.
pub(crate) async fn run_command(program: &str, args: &[&str]) -> Result<String, WifiError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| WifiError::Spawn {
            program: program.to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(WifiError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
