//! macOS adapter driving `networksetup` and the legacy `airport` utility.

use crate::{LinkState, NetworkHandle, WifiControl, WifiError, run_command};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

const JOIN_RETRY: Duration = Duration::from_secs(1);
const GATEWAY_POLL: Duration = Duration::from_millis(200);
const ARP_POLL: Duration = Duration::from_secs(1);

/// Path of the Apple80211 `airport` utility.
const AIRPORT: &str =
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";

/// `networksetup`/`airport`-backed wireless control.
pub struct MacWifi {
    interface: String,
    link: Mutex<Option<LinkState>>,
}

impl MacWifi {
    /// Create an adapter bound to the Wi-Fi hardware port.
    ///
    /// # Errors
    ///
    /// Returns an error if `networksetup` cannot be run or no Wi-Fi port
    /// is listed.
    pub async fn new() -> Result<Self, WifiError> {
        let out = run_command("networksetup", &["-listallhardwareports"]).await?;
        let interface = wifi_port_device(&out).ok_or(WifiError::NoInterface)?;
        debug!(%interface, "using wireless interface");
        Ok(Self {
            interface,
            link: Mutex::new(None),
        })
    }

    fn set_link(&self, state: LinkState) {
        *self.link.lock().expect("wifi link state lock poisoned") = Some(state);
    }

    fn take_link(&self) -> Option<LinkState> {
        self.link.lock().expect("wifi link state lock poisoned").take()
    }

    fn peek_link(&self) -> Option<LinkState> {
        self.link.lock().expect("wifi link state lock poisoned").clone()
    }

    async fn associated_ssid(&self) -> Result<Option<String>, WifiError> {
        let out = run_command("networksetup", &["-getairportnetwork", &self.interface]).await?;
        Ok(parse_current_network(&out))
    }
}

#[async_trait]
impl WifiControl for MacWifi {
    async fn current_network(&self) -> Result<NetworkHandle, WifiError> {
        Ok(match self.associated_ssid().await? {
            Some(ssid) => NetworkHandle::new(ssid),
            None => NetworkHandle::none(),
        })
    }

    async fn host_adhoc(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError> {
        debug!(%ssid, "starting IBSS network");
        // IBSS creation was removed from recent macOS releases; when the
        // flag is gone the command fails and the error surfaces as-is.
        run_command(
            AIRPORT,
            &[
                &self.interface,
                &format!("--ibss={ssid}"),
                &format!("--password={passphrase}"),
                "--channel=11",
            ],
        )
        .await?;
        self.set_link(LinkState::Hosting {
            ssid: ssid.to_string(),
        });
        Ok(())
    }

    async fn join_adhoc(
        &self,
        ssid: &str,
        passphrase: &str,
        deadline: Duration,
    ) -> Result<(), WifiError> {
        self.set_link(LinkState::Joined {
            ssid: ssid.to_string(),
        });

        let started = Instant::now();
        loop {
            let attempt = run_command(
                "networksetup",
                &["-setairportnetwork", &self.interface, ssid, passphrase],
            )
            .await;

            // networksetup exits zero even when association fails, so
            // verify by reading the network back.
            match attempt {
                Ok(_) => {
                    if self.associated_ssid().await?.as_deref() == Some(ssid) {
                        return Ok(());
                    }
                }
                Err(e) => debug!(%ssid, error = %e, "association attempt failed"),
            }

            if started.elapsed() >= deadline {
                return Err(WifiError::JoinTimeout {
                    ssid: ssid.to_string(),
                    seconds: deadline.as_secs(),
                });
            }
            sleep(JOIN_RETRY).await;
        }
    }

    async fn find_peer_ip(&self, deadline: Duration) -> Result<IpAddr, WifiError> {
        let hosting = matches!(self.peek_link(), Some(LinkState::Hosting { .. }));
        let started = Instant::now();
        loop {
            let found = if hosting {
                let out =
                    run_command("arp", &["-a", "-n", "-i", &self.interface]).await?;
                parse_arp_entry(&out)
            } else {
                let out = run_command("route", &["-n", "get", "default"]).await?;
                parse_route_gateway(&out)
            };
            if let Some(ip) = found {
                debug!(%ip, hosting, "resolved peer address");
                return Ok(ip);
            }
            if started.elapsed() >= deadline {
                return Err(WifiError::PeerNotFound {
                    seconds: deadline.as_secs(),
                });
            }
            sleep(if hosting { ARP_POLL } else { GATEWAY_POLL }).await;
        }
    }

    async fn restore(&self, previous: &NetworkHandle) -> Result<(), WifiError> {
        let mut first_err = None;

        if self.take_link().is_some() {
            // Dropping the association also tears down a hosted IBSS.
            match run_command(AIRPORT, &["-z"]).await {
                Ok(_) => debug!("disassociated from transfer network"),
                Err(e) => {
                    warn!(error = %e, "could not disassociate");
                    first_err.get_or_insert(e);
                }
            }
        }

        if let Some(ssid) = previous.id() {
            // No password: known networks rejoin from the keychain.
            match run_command(
                "networksetup",
                &["-setairportnetwork", &self.interface, ssid],
            )
            .await
            {
                Ok(_) => debug!(%ssid, "rejoined previous network"),
                Err(e) => {
                    warn!(%ssid, error = %e, "could not rejoin previous network");
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Device name of the Wi-Fi hardware port from
/// `networksetup -listallhardwareports`.
fn wifi_port_device(out: &str) -> Option<String> {
    let mut lines = out.lines();
    while let Some(line) = lines.next() {
        if line.trim() == "Hardware Port: Wi-Fi" {
            let device_line = lines.next()?;
            return device_line
                .trim()
                .strip_prefix("Device: ")
                .map(str::to_string);
        }
    }
    None
}

/// SSID from `networksetup -getairportnetwork` output, if associated.
fn parse_current_network(out: &str) -> Option<String> {
    out.trim()
        .strip_prefix("Current Wi-Fi Network: ")
        .map(str::to_string)
}

/// Gateway address from `route -n get default` output.
fn parse_route_gateway(out: &str) -> Option<IpAddr> {
    out.lines().find_map(|line| {
        line.trim()
            .strip_prefix("gateway: ")?
            .parse()
            .ok()
    })
}

/// First complete ARP entry from `arp -a` output.
fn parse_arp_entry(out: &str) -> Option<IpAddr> {
    out.lines().find_map(|line| {
        if line.contains("incomplete") {
            return None;
        }
        let start = line.find('(')? + 1;
        let end = line.find(')')?;
        line.get(start..end)?.parse().ok()
    })
}
