//! TCP rendezvous over the ad-hoc link.
//!
//! The sender dials, the receiver listens; both loop in small bounded
//! steps so cancellation is observed within a second at worst.

use crate::TransferError;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-attempt connect timeout inside the dial loop
const DIAL_ATTEMPT: Duration = Duration::from_millis(10);

/// Pause between dial attempts
const DIAL_RETRY: Duration = Duration::from_secs(1);

/// Accept poll interval; cancellation is re-checked at this cadence
const ACCEPT_POLL: Duration = Duration::from_secs(1);

/// Dial the peer until it answers, the deadline passes, or cancellation.
///
/// Each attempt gets 10 ms; attempts are spaced 1 s apart, matching the
/// peer's own bring-up cadence. Ownership of the stream passes to the
/// caller.
///
/// # Errors
///
/// Returns `Network` once the deadline elapses without a connection, or
/// `Cancelled` if the token fires first.
pub async fn dial(
    peer: IpAddr,
    port: u16,
    cancel: &CancellationToken,
    deadline: Duration,
) -> Result<TcpStream, TransferError> {
    let addr = SocketAddr::new(peer, port);
    let started = Instant::now();

    while started.elapsed() < deadline {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        if let Ok(Ok(stream)) = timeout(DIAL_ATTEMPT, TcpStream::connect(addr)).await {
            debug!(%addr, "dialed peer");
            let _ = stream.set_nodelay(true);
            return Ok(stream);
        }

        tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            () = sleep(DIAL_RETRY) => {}
        }
    }

    Err(TransferError::Network(format!(
        "no connection to {addr} after {} seconds",
        deadline.as_secs()
    )))
}

/// Accept the first connection on `port`, polling for cancellation.
///
/// The listener is bound immediately and dropped (closed) when this
/// returns, whatever the outcome; the accepted stream is handed to the
/// caller.
///
/// # Errors
///
/// Returns `Network` if binding or accepting fails, or `Cancelled` if the
/// token fires while waiting.
pub async fn accept(port: u16, cancel: &CancellationToken) -> Result<TcpStream, TransferError> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
        .await
        .map_err(|e| TransferError::Network(format!("could not listen on port {port}: {e}")))?;
    debug!(port, "listening for peer");

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            polled = timeout(ACCEPT_POLL, listener.accept()) => match polled {
                Ok(Ok((stream, peer))) => {
                    debug!(%peer, "accepted connection");
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    return Err(TransferError::Network(format!("accept failed: {e}")));
                }
                // Poll window expired; loop to re-check cancellation.
                Err(_) => {}
            },
        }
    }
}
