//! Linux adapter driving NetworkManager through `nmcli`.

use crate::{LinkState, NetworkHandle, WifiControl, WifiError, run_command};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

const JOIN_RETRY: Duration = Duration::from_secs(1);
const GATEWAY_POLL: Duration = Duration::from_millis(200);
const NEIGHBOUR_POLL: Duration = Duration::from_secs(1);

/// NetworkManager-backed wireless control.
pub struct LinuxWifi {
    interface: String,
    link: Mutex<Option<LinkState>>,
}

impl LinuxWifi {
    /// Create an adapter bound to the first wireless interface.
    ///
    /// # Errors
    ///
    /// Returns an error if `nmcli` cannot be run or no wireless device is
    /// present.
    pub async fn new() -> Result<Self, WifiError> {
        let out = run_command("nmcli", &["-t", "device"]).await?;
        let interface = first_wifi_device(&out).ok_or(WifiError::NoInterface)?;
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

    async fn profile_exists(&self, ssid: &str) -> bool {
        match run_command("nmcli", &["-t", "-f", "NAME", "connection", "show"]).await {
            Ok(out) => out.lines().any(|line| line == ssid),
            Err(_) => false,
        }
    }

    async fn add_join_profile(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError> {
        run_command(
            "nmcli",
            &[
                "connection", "add", "type", "wifi", "ifname", &self.interface, "con-name", ssid,
                "autoconnect", "yes", "ssid", ssid,
            ],
        )
        .await?;
        run_command(
            "nmcli",
            &["connection", "modify", ssid, "wifi-sec.key-mgmt", "wpa-psk"],
        )
        .await?;
        run_command(
            "nmcli",
            &["connection", "modify", ssid, "wifi-sec.psk", passphrase],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WifiControl for LinuxWifi {
    async fn current_network(&self) -> Result<NetworkHandle, WifiError> {
        let out = run_command(
            "nmcli",
            &["-t", "-f", "UUID,TYPE,DEVICE", "connection", "show", "--active"],
        )
        .await?;
        Ok(match active_connection(&out, &self.interface) {
            Some(uuid) => NetworkHandle::new(uuid),
            None => NetworkHandle::none(),
        })
    }

    async fn host_adhoc(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError> {
        debug!(%ssid, "starting hotspot");
        run_command(
            "nmcli",
            &[
                "connection", "add", "type", "wifi", "ifname", &self.interface, "con-name", ssid,
                "autoconnect", "yes", "ssid", ssid,
            ],
        )
        .await?;
        // Profile exists from here on; record it so restore can clean up
        // even if a later step fails.
        self.set_link(LinkState::Hosting {
            ssid: ssid.to_string(),
        });

        let modifications: &[&[&str]] = &[
            &["802-11-wireless.mode", "ap", "ipv4.method", "shared"],
            &["wifi-sec.key-mgmt", "wpa-psk"],
            // disabling Protected Management Frames disables WPA3/SAE,
            // which M1 Macs need in order to join a Linux hotspot
            &["wifi-sec.pmf", "disable"],
            &["wifi-sec.pairwise", "ccmp"],
            &["wifi-sec.group", "ccmp"],
            &["wifi-sec.proto", "rsn"],
            &["wifi-sec.psk", passphrase],
        ];
        for modification in modifications {
            let mut args = vec!["connection", "modify", ssid];
            args.extend_from_slice(modification);
            run_command("nmcli", &args).await?;
        }

        run_command("nmcli", &["connection", "up", ssid]).await?;
        Ok(())
    }

    async fn join_adhoc(
        &self,
        ssid: &str,
        passphrase: &str,
        deadline: Duration,
    ) -> Result<(), WifiError> {
        // Re-issued by the keepalive task, so only create the profile once.
        if !self.profile_exists(ssid).await {
            debug!(%ssid, "joining hotspot");
            self.add_join_profile(ssid, passphrase).await?;
        }
        self.set_link(LinkState::Joined {
            ssid: ssid.to_string(),
        });

        let started = Instant::now();
        loop {
            match run_command("nmcli", &["connection", "up", ssid]).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if started.elapsed() >= deadline {
                        warn!(%ssid, error = %e, "association attempts exhausted");
                        return Err(WifiError::JoinTimeout {
                            ssid: ssid.to_string(),
                            seconds: deadline.as_secs(),
                        });
                    }
                    debug!(%ssid, error = %e, "association failed, retrying");
                    sleep(JOIN_RETRY).await;
                }
            }
        }
    }

    async fn find_peer_ip(&self, deadline: Duration) -> Result<IpAddr, WifiError> {
        let hosting = matches!(self.peek_link(), Some(LinkState::Hosting { .. }));
        let started = Instant::now();
        loop {
            let found = if hosting {
                let out =
                    run_command("ip", &["-4", "neigh", "show", "dev", &self.interface]).await?;
                parse_neighbour(&out)
            } else {
                let out = run_command(
                    "ip",
                    &["-4", "route", "show", "default", "dev", &self.interface],
                )
                .await?;
                parse_gateway(&out)
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
            sleep(if hosting { NEIGHBOUR_POLL } else { GATEWAY_POLL }).await;
        }
    }

    async fn restore(&self, previous: &NetworkHandle) -> Result<(), WifiError> {
        let mut first_err = None;

        if let Some(LinkState::Hosting { ssid } | LinkState::Joined { ssid }) = self.take_link() {
            match run_command("nmcli", &["connection", "delete", &ssid]).await {
                Ok(_) => debug!(%ssid, "removed transfer connection"),
                Err(e) => {
                    warn!(%ssid, error = %e, "could not remove transfer connection");
                    first_err.get_or_insert(e);
                }
            }
        }

        if let Some(uuid) = previous.id() {
            match run_command("nmcli", &["connection", "up", "uuid", uuid]).await {
                Ok(_) => debug!(%uuid, "reactivated previous connection"),
                Err(e) => {
                    warn!(%uuid, error = %e, "could not reactivate previous connection");
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

/// First device of type `wifi` in `nmcli -t device` output.
fn first_wifi_device(out: &str) -> Option<String> {
    out.lines().find_map(|line| {
        let mut fields = line.split(':');
        let device = fields.next()?;
        let kind = fields.next()?;
        (kind == "wifi").then(|| device.to_string())
    })
}

/// UUID of the active connection on `interface`, from
/// `nmcli -t -f UUID,TYPE,DEVICE connection show --active`.
fn active_connection(out: &str, interface: &str) -> Option<String> {
    out.lines().find_map(|line| {
        let mut fields = line.split(':');
        let uuid = fields.next()?;
        let _kind = fields.next()?;
        let device = fields.next()?;
        (device == interface).then(|| uuid.to_string())
    })
}

/// Gateway address from `ip -4 route show default` output.
fn parse_gateway(out: &str) -> Option<IpAddr> {
    let mut fields = out.split_whitespace();
    while let Some(token) = fields.next() {
        if token == "via" {
            return fields.next()?.parse().ok();
        }
    }
    None
}

/// First resolved neighbour from `ip -4 neigh show` output.
fn parse_neighbour(out: &str) -> Option<IpAddr> {
    out.lines().find_map(|line| {
        if line.contains("FAILED") || !line.contains("lladdr") {
            return None;
        }
        line.split_whitespace().next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_wifi_device() {
        let out = "lo:loopback:unmanaged:\neth0:ethernet:connected:Wired\nwlan0:wifi:connected:HomeNet\n";
        assert_eq!(first_wifi_device(out).as_deref(), Some("wlan0"));
        assert_eq!(first_wifi_device("lo:loopback:unmanaged:\n"), None);
    }

    #[test]
    fn test_active_connection() {
        let out = "0aa5d12c-ffd5-4f31-a826-b8acc4c0e1dd:802-11-wireless:wlan0\n\
                   9b29e2a1-6c3b-4f89-8f56-1d2f6a1f3a77:802-3-ethernet:eth0\n";
        assert_eq!(
            active_connection(out, "wlan0").as_deref(),
            Some("0aa5d12c-ffd5-4f31-a826-b8acc4c0e1dd")
        );
        assert_eq!(active_connection(out, "wlan1"), None);
    }

    #[test]
    fn test_parse_gateway() {
        let out = "default via 192.168.4.1 proto dhcp metric 600\n";
        assert_eq!(
            parse_gateway(out),
            Some("192.168.4.1".parse::<IpAddr>().unwrap())
        );
        assert_eq!(parse_gateway(""), None);
        assert_eq!(parse_gateway("default dev wlan0 scope link\n"), None);
    }

    #[test]
    fn test_parse_neighbour() {
        let out = "192.168.4.17 lladdr aa:bb:cc:dd:ee:ff REACHABLE\n";
        assert_eq!(
            parse_neighbour(out),
            Some("192.168.4.17".parse::<IpAddr>().unwrap())
        );
        assert_eq!(parse_neighbour("192.168.4.9 FAILED\n"), None);
        assert_eq!(parse_neighbour(""), None);
    }
}
