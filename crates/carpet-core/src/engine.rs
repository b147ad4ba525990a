//! The transfer state machine.
//!
//! One engine drives one transfer to completion: prepare, capture the
//! wireless state, bring up or join the ad-hoc link, rendezvous over TCP,
//! move the file frames, and tear everything down. Teardown runs on every
//! exit path; the wireless restore in particular is called exactly once
//! per captured network, whatever the outcome.

use crate::config::{LinkRole, Mode, Os, TransferConfig, link_role};
use crate::error::TransferError;
use crate::rendezvous;
use carpet_crypto::{
    ChunkCipher, TransferKey, derive_key, derive_network_psk, derive_ssid, generate_passphrase,
    validate_passphrase,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use carpet_wifi::WifiControl;

/// How often the keepalive task re-issues the join command
const KEEPALIVE_POLL: Duration = Duration::from_secs(5);

const BANNER: &str = "=============================";

/// Per-transfer state, owned by the driver task.
struct TransferState {
    ssid: String,
    /// WPA2 pre-shared key for the link; the raw 4-character passphrase
    /// is too short to be one.
    network_psk: String,
    key: TransferKey,
}

/// Drives one transfer from configuration to restored wireless state.
pub struct TransferEngine {
    wifi: Arc<dyn WifiControl>,
}

impl TransferEngine {
    /// Create an engine around a wireless control adapter.
    pub fn new(wifi: impl WifiControl + 'static) -> Self {
        Self {
            wifi: Arc::new(wifi),
        }
    }

    /// Run the transfer to completion.
    ///
    /// Returns after the transfer has completed, failed, or been
    /// cancelled, and only after the wireless state captured at the start
    /// has been restored. Failures are also reported through the progress
    /// sink, followed by `Aborting transfer.`.
    ///
    /// # Errors
    ///
    /// Returns the first error any stage produced; see [`TransferError`]
    /// for the taxonomy.
    pub async fn run(&self, config: TransferConfig) -> Result<(), TransferError> {
        let result = self.drive(&config).await;
        if let Err(e) = &result {
            config.progress.log(&e.to_string());
            config.progress.log("Aborting transfer.");
        }
        result
    }

    async fn drive(&self, config: &TransferConfig) -> Result<(), TransferError> {
        // Prepare: everything that can fail before touching the radio.
        let state = self.prepare(config).await?;

        // Capture the pre-transfer wireless state. From here on, every
        // exit path runs the teardown below.
        let previous = self.wifi.current_network().await?;

        let mut keepalive = Keepalive::new(&config.cancel);
        let mut stream_slot: Option<TcpStream> = None;
        let result = self
            .connected(config, &state, &mut stream_slot, &mut keepalive)
            .await;

        // Teardown: stop the keepalive task, close the stream, restore
        // the radio. Restore failures are reported, never propagated.
        keepalive.stop().await;
        if let Some(mut stream) = stream_slot.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "tcp shutdown failed");
            }
        }
        if let Err(e) = self.wifi.restore(&previous).await {
            config
                .progress
                .log(&format!("Could not restore wireless state: {e}"));
        }

        result
    }

    /// Validate inputs, settle the passphrase, derive SSID and key.
    async fn prepare(&self, config: &TransferConfig) -> Result<TransferState, TransferError> {
        let passphrase = match &config.mode {
            Mode::Send(paths) => {
                if paths.is_empty() {
                    return Err(TransferError::Config("no files to send".to_string()));
                }
                for path in paths {
                    let meta = tokio::fs::metadata(path).await.map_err(|e| {
                        TransferError::LocalIo(io::Error::new(
                            e.kind(),
                            format!("could not read {}: {e}", path.display()),
                        ))
                    })?;
                    if !meta.is_file() {
                        return Err(TransferError::LocalIo(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("{} is not a regular file", path.display()),
                        )));
                    }
                }

                let entered = config
                    .progress
                    .prompt_passphrase()
                    .map_err(|e| TransferError::Config(format!("could not read passphrase: {e}")))?
                    .trim()
                    .to_string();
                validate_passphrase(&entered).map_err(|e| TransferError::Config(e.to_string()))?;
                entered
            }
            Mode::Receive(dir) => {
                let meta = tokio::fs::metadata(dir).await.map_err(|e| {
                    TransferError::LocalIo(io::Error::new(
                        e.kind(),
                        format!("could not read {}: {e}", dir.display()),
                    ))
                })?;
                if !meta.is_dir() {
                    return Err(TransferError::LocalIo(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{} is not a directory", dir.display()),
                    )));
                }

                let generated = generate_passphrase();
                config.progress.show_passphrase(&generated);
                generated
            }
        };

        let ssid = derive_ssid(&passphrase);
        let network_psk = derive_network_psk(&passphrase);
        let key = derive_key(&passphrase)
            .map_err(|e| TransferError::Config(format!("key derivation failed: {e}")))?;
        debug!(%ssid, "derived network name and transfer key");

        Ok(TransferState {
            ssid,
            network_psk,
            key,
        })
    }

    /// Everything between network capture and teardown.
    async fn connected(
        &self,
        config: &TransferConfig,
        state: &TransferState,
        stream_slot: &mut Option<TcpStream>,
        keepalive: &mut Keepalive,
    ) -> Result<(), TransferError> {
        let progress = &config.progress;

        // JoinOrHost, per the role matrix.
        match link_role(Os::CURRENT, config.peer_os, config.mode.direction()) {
            LinkRole::Host => {
                progress.log(&format!("Starting ad-hoc network {}", state.ssid));
                self.wifi
                    .host_adhoc(&state.ssid, &state.network_psk)
                    .await?;
            }
            LinkRole::Join => {
                progress.log(&format!("Joining ad-hoc network {}", state.ssid));
                self.wifi
                    .join_adhoc(&state.ssid, &state.network_psk, config.timeouts.join)
                    .await?;
                keepalive.spawn(self.wifi.clone(), &state.ssid, &state.network_psk);
            }
        }
        if config.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let cipher = ChunkCipher::new(&state.key);
        match &config.mode {
            Mode::Send(paths) => {
                let peer_ip = self.wifi.find_peer_ip(config.timeouts.peer_ip).await?;
                progress.log(&format!(
                    "Trying to connect to {peer_ip} for {} seconds",
                    config.timeouts.dial.as_secs()
                ));
                let stream =
                    rendezvous::dial(peer_ip, config.port, &config.cancel, config.timeouts.dial)
                        .await?;
                progress.log("Connected");
                let stream = stream_slot.insert(stream);

                tokio::select! {
                    () = config.cancel.cancelled() => return Err(TransferError::Cancelled),
                    written = stream.write_u64_le(paths.len() as u64) => written.map_err(|e| {
                        TransferError::Network(format!("could not send file count: {e}"))
                    })?,
                }

                for (i, path) in paths.iter().enumerate() {
                    if paths.len() > 1 {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string());
                        progress.log(BANNER);
                        progress.log(&format!(
                            "Beginning transfer {} of {}. Filename: {name}",
                            i + 1,
                            paths.len()
                        ));
                    }
                    let sink = Arc::clone(progress);
                    carpet_wire::send_file(stream, &cipher, path, &config.cancel, move |p| {
                        sink.progress(p);
                    })
                    .await?;
                }

                progress.log("Send complete, resetting WiFi and exiting.");
            }
            Mode::Receive(dir) => {
                progress.log(&format!("Listening on port {}", config.port));
                let stream = rendezvous::accept(config.port, &config.cancel).await?;
                progress.log("Connection accepted");
                let stream = stream_slot.insert(stream);

                let count = tokio::select! {
                    () = config.cancel.cancelled() => return Err(TransferError::Cancelled),
                    read = stream.read_u64_le() => read.map_err(|e| {
                        TransferError::Network(format!("could not read file count: {e}"))
                    })?,
                };

                for i in 0..count {
                    if count > 1 {
                        progress.log(BANNER);
                        progress.log(&format!("Receiving file {} of {count}.", i + 1));
                    }
                    let sink = Arc::clone(progress);
                    let written =
                        carpet_wire::recv_file(stream, &cipher, dir, &config.cancel, move |p| {
                            sink.progress(p);
                        })
                        .await?;
                    progress.log(&format!("Received {}", written.display()));
                }

                progress.log("Reception complete, resetting WiFi and exiting.");
            }
        }

        Ok(())
    }
}

/// Background task that re-issues the join command if the OS drops the
/// ad-hoc link mid-transfer.
///
/// Never touches the TCP stream or transfer state; its only interaction
/// with the rest of the engine is the cancellation token it inherits.
struct Keepalive {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Keepalive {
    fn new(cancel: &CancellationToken) -> Self {
        Self {
            token: cancel.child_token(),
            handle: None,
        }
    }

    fn spawn(&mut self, wifi: Arc<dyn WifiControl>, ssid: &str, psk: &str) {
        let token = self.token.clone();
        let ssid = ssid.to_string();
        let psk = psk.to_string();
        self.handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = sleep(KEEPALIVE_POLL) => {
                        // The join is idempotent at the adapter level; a
                        // still-associated link makes this a cheap no-op.
                        if let Err(e) = wifi.join_adhoc(&ssid, &psk, KEEPALIVE_POLL).await {
                            warn!(%ssid, error = %e, "keepalive rejoin failed");
                        }
                    }
                }
            }
        }));
    }

    /// Cancel the task and wait for it to finish any in-flight OS call.
    async fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
