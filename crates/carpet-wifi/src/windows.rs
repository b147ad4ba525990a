//! Windows adapter driving the WLAN AutoConfig service through `netsh`.

use crate::{LinkState, NetworkHandle, WifiControl, WifiError, run_command};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

const JOIN_RETRY: Duration = Duration::from_secs(1);
const ARP_POLL: Duration = Duration::from_secs(1);

/// Gateway address Windows assigns itself on the hosted network.
const HOSTED_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 137, 1);

/// `netsh wlan`-backed wireless control.
pub struct WindowsWifi {
    link: Mutex<Option<LinkState>>,
}

impl WindowsWifi {
    /// Create an adapter, verifying a wireless interface is present.
    ///
    /// # Errors
    ///
    /// Returns an error if `netsh` cannot be run or reports no wireless
    /// interface.
    pub async fn new() -> Result<Self, WifiError> {
        let out = run_command("netsh", &["wlan", "show", "interfaces"]).await?;
        if out.contains("There is no wireless interface") {
            return Err(WifiError::NoInterface);
        }
        Ok(Self {
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
        let out = run_command("netsh", &["wlan", "show", "interfaces"]).await?;
        Ok(parse_interface_ssid(&out))
    }
}

#[async_trait]
impl WifiControl for WindowsWifi {
    async fn current_network(&self) -> Result<NetworkHandle, WifiError> {
        Ok(match self.associated_ssid().await? {
            Some(ssid) => NetworkHandle::new(ssid),
            None => NetworkHandle::none(),
        })
    }

    async fn host_adhoc(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError> {
        debug!(%ssid, "starting hosted network");
        run_command(
            "netsh",
            &[
                "wlan",
                "set",
                "hostednetwork",
                "mode=allow",
                &format!("ssid={ssid}"),
                &format!("key={passphrase}"),
            ],
        )
        .await?;
        self.set_link(LinkState::Hosting {
            ssid: ssid.to_string(),
        });
        run_command("netsh", &["wlan", "start", "hostednetwork"]).await?;
        Ok(())
    }

    async fn join_adhoc(
        &self,
        ssid: &str,
        passphrase: &str,
        deadline: Duration,
    ) -> Result<(), WifiError> {
        // Connecting by name needs a stored profile; write one to a
        // temporary file and import it. Re-importing an existing profile
        // is harmless.
        let profile_path = std::env::temp_dir().join(format!("{ssid}.xml"));
        tokio::fs::write(&profile_path, wlan_profile_xml(ssid, passphrase))
            .await
            .map_err(|e| WifiError::Spawn {
                program: "wlan profile".to_string(),
                source: e,
            })?;
        let add_result = run_command(
            "netsh",
            &[
                "wlan",
                "add",
                "profile",
                &format!("filename={}", profile_path.display()),
            ],
        )
        .await;
        let _ = tokio::fs::remove_file(&profile_path).await;
        add_result?;

        self.set_link(LinkState::Joined {
            ssid: ssid.to_string(),
        });

        let started = Instant::now();
        loop {
            let attempt = run_command(
                "netsh",
                &["wlan", "connect", &format!("name={ssid}")],
            )
            .await;

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
        if !matches!(self.peek_link(), Some(LinkState::Hosting { .. })) {
            // Joining side: the hosted network gateway is fixed.
            return Ok(IpAddr::V4(HOSTED_GATEWAY));
        }

        let started = Instant::now();
        loop {
            let out = run_command("arp", &["-a"]).await?;
            if let Some(ip) = parse_hosted_client(&out) {
                debug!(%ip, "resolved peer address");
                return Ok(ip);
            }
            if started.elapsed() >= deadline {
                return Err(WifiError::PeerNotFound {
                    seconds: deadline.as_secs(),
                });
            }
            sleep(ARP_POLL).await;
        }
    }

    async fn restore(&self, previous: &NetworkHandle) -> Result<(), WifiError> {
        let mut first_err = None;

        match self.take_link() {
            Some(LinkState::Hosting { .. }) => {
                match run_command("netsh", &["wlan", "stop", "hostednetwork"]).await {
                    Ok(_) => debug!("stopped hosted network"),
                    Err(e) => {
                        warn!(error = %e, "could not stop hosted network");
                        first_err.get_or_insert(e);
                    }
                }
            }
            Some(LinkState::Joined { ssid }) => {
                match run_command(
                    "netsh",
                    &["wlan", "delete", "profile", &format!("name={ssid}")],
                )
                .await
                {
                    Ok(_) => debug!(%ssid, "removed transfer profile"),
                    Err(e) => {
                        warn!(%ssid, error = %e, "could not remove transfer profile");
                        first_err.get_or_insert(e);
                    }
                }
            }
            None => {}
        }

        if let Some(ssid) = previous.id() {
            match run_command("netsh", &["wlan", "connect", &format!("name={ssid}")]).await {
                Ok(_) => debug!(%ssid, "reconnected to previous network"),
                Err(e) => {
                    warn!(%ssid, error = %e, "could not reconnect to previous network");
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

/// WPA2-PSK profile document for `netsh wlan add profile`.
fn wlan_profile_xml(ssid: &str, passphrase: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<WLANProfile xmlns="http://www.microsoft.com/networking/WLAN/profile/v1">
    <name>{ssid}</name>
    <SSIDConfig>
        <SSID>
            <name>{ssid}</name>
        </SSID>
    </SSIDConfig>
    <connectionType>ESS</connectionType>
    <connectionMode>auto</connectionMode>
    <MSM>
        <security>
            <authEncryption>
                <authentication>WPA2PSK</authentication>
                <encryption>AES</encryption>
                <useOneX>false</useOneX>
            </authEncryption>
            <sharedKey>
                <keyType>passPhrase</keyType>
                <protected>false</protected>
                <keyMaterial>{passphrase}</keyMaterial>
            </sharedKey>
        </security>
    </MSM>
</WLANProfile>
"#
    )
}

/// SSID of the connected interface from `netsh wlan show interfaces`.
fn parse_interface_ssid(out: &str) -> Option<String> {
    out.lines().find_map(|line| {
        let trimmed = line.trim_start();
        if trimmed.starts_with("BSSID") || !trimmed.starts_with("SSID") {
            return None;
        }
        let (_, value) = trimmed.split_once(':')?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// First hosted-network client from `arp -a` output.
///
/// Clients land in 192.168.137.0/24; the gateway and broadcast addresses
/// are ours, not a peer.
fn parse_hosted_client(out: &str) -> Option<IpAddr> {
    out.lines().find_map(|line| {
        let first = line.split_whitespace().next()?;
        let ip: Ipv4Addr = first.parse().ok()?;
        let in_subnet = ip.octets()[..3] == [192, 168, 137];
        (in_subnet && ip != HOSTED_GATEWAY && ip.octets()[3] != 255).then_some(IpAddr::V4(ip))
    })
}
