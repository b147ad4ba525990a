//! Integration tests: sender and receiver engines joined over loopback
//! with a stubbed wireless adapter.
//!
//! The stub stands in for the OS radio: the "ad-hoc link" is localhost,
//! and every test asserts the wireless restore ran exactly once per side
//! whatever the outcome.

use async_trait::async_trait;
use carpet_core::{
    Mode, Os, ProgressSink, Timeouts, TransferConfig, TransferEngine, TransferError,
};
use carpet_wifi::{NetworkHandle, WifiControl, WifiError};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Wireless stub: no radio, the peer is always localhost.
struct StubWifi {
    restores: Arc<AtomicUsize>,
    join_fails: bool,
}

impl StubWifi {
    fn new(restores: Arc<AtomicUsize>) -> Self {
        Self {
            restores,
            join_fails: false,
        }
    }

    fn failing_join(restores: Arc<AtomicUsize>) -> Self {
        Self {
            restores,
            join_fails: true,
        }
    }
}

#[async_trait]
impl WifiControl for StubWifi {
    async fn current_network(&self) -> Result<NetworkHandle, WifiError> {
        Ok(NetworkHandle::new("previous-network"))
    }

    async fn host_adhoc(&self, _ssid: &str, _passphrase: &str) -> Result<(), WifiError> {
        Ok(())
    }

    async fn join_adhoc(
        &self,
        ssid: &str,
        _passphrase: &str,
        _deadline: Duration,
    ) -> Result<(), WifiError> {
        if self.join_fails {
            return Err(WifiError::JoinTimeout {
                ssid: ssid.to_string(),
                seconds: 60,
            });
        }
        Ok(())
    }

    async fn find_peer_ip(&self, _deadline: Duration) -> Result<IpAddr, WifiError> {
        Ok(LOCALHOST)
    }

    async fn restore(&self, previous: &NetworkHandle) -> Result<(), WifiError> {
        assert_eq!(previous.id(), Some("previous-network"));
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Recording sink. The receiving side publishes its generated passphrase
/// into the shared slot; the sending side's prompt waits for it.
struct RecorderSink {
    lines: Mutex<Vec<String>>,
    percents: Mutex<Vec<u8>>,
    passphrase_slot: Arc<Mutex<Option<String>>>,
    cancel_at: Option<(u8, CancellationToken)>,
}

impl RecorderSink {
    fn new(passphrase_slot: Arc<Mutex<Option<String>>>) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
            percents: Mutex::new(Vec::new()),
            passphrase_slot,
            cancel_at: None,
        })
    }

    fn cancelling_at(
        passphrase_slot: Arc<Mutex<Option<String>>>,
        percent: u8,
        token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
            percents: Mutex::new(Vec::new()),
            passphrase_slot,
            cancel_at: Some((percent, token)),
        })
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn percents(&self) -> Vec<u8> {
        self.percents.lock().unwrap().clone()
    }
}

impl ProgressSink for RecorderSink {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn progress(&self, percent: u8) {
        self.percents.lock().unwrap().push(percent);
        if let Some((threshold, token)) = &self.cancel_at {
            if percent >= *threshold {
                token.cancel();
            }
        }
    }

    fn prompt_passphrase(&self) -> io::Result<String> {
        // The receiving engine publishes the passphrase at its own
        // prepare stage; poll until it lands.
        for _ in 0..600 {
            if let Some(p) = self.passphrase_slot.lock().unwrap().clone() {
                return Ok(p);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "no passphrase published",
        ))
    }

    fn show_passphrase(&self, passphrase: &str) {
        *self.passphrase_slot.lock().unwrap() = Some(passphrase.to_string());
    }
}

fn preset_passphrase(value: &str) -> Arc<Mutex<Option<String>>> {
    Arc::new(Mutex::new(Some(value.to_string())))
}

fn make_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn config(
    mode: Mode,
    port: u16,
    progress: Arc<RecorderSink>,
    cancel: CancellationToken,
) -> TransferConfig {
    TransferConfig {
        mode,
        peer_os: Os::CURRENT,
        port,
        timeouts: Timeouts::default(),
        progress,
        cancel,
    }
}

/// Run a sender and a receiver engine concurrently and return their
/// outcomes plus per-side restore counts.
async fn run_pair(
    port: u16,
    paths: Vec<PathBuf>,
    dest: &Path,
    sender_sink: Arc<RecorderSink>,
    receiver_sink: Arc<RecorderSink>,
    sender_cancel: CancellationToken,
    receiver_cancel: CancellationToken,
) -> (
    Result<(), TransferError>,
    Result<(), TransferError>,
    usize,
    usize,
) {
    let sender_restores = Arc::new(AtomicUsize::new(0));
    let receiver_restores = Arc::new(AtomicUsize::new(0));

    let receiver = {
        let restores = receiver_restores.clone();
        let dest = dest.to_path_buf();
        tokio::spawn(async move {
            let engine = TransferEngine::new(StubWifi::new(restores));
            engine
                .run(config(
                    Mode::Receive(dest),
                    port,
                    receiver_sink,
                    receiver_cancel,
                ))
                .await
        })
    };

    let sender = {
        let restores = sender_restores.clone();
        tokio::spawn(async move {
            let engine = TransferEngine::new(StubWifi::new(restores));
            engine
                .run(config(Mode::Send(paths), port, sender_sink, sender_cancel))
                .await
        })
    };

    let sender_result = sender.await.unwrap();
    let receiver_result = receiver.await.unwrap();
    (
        sender_result,
        receiver_result,
        sender_restores.load(Ordering::SeqCst),
        receiver_restores.load(Ordering::SeqCst),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_small_file() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = make_file(src.path(), "a.bin", &[0x01, 0x02, 0x03, 0x04, 0x05]);

    let slot = Arc::new(Mutex::new(None));
    let sender_sink = RecorderSink::new(slot.clone());
    let receiver_sink = RecorderSink::new(slot);

    let (sent, received, sender_restores, receiver_restores) = run_pair(
        24031,
        vec![path],
        dest.path(),
        sender_sink.clone(),
        receiver_sink.clone(),
        CancellationToken::new(),
        CancellationToken::new(),
    )
    .await;

    sent.unwrap();
    received.unwrap();
    assert_eq!(sender_restores, 1);
    assert_eq!(receiver_restores, 1);

    assert_eq!(
        std::fs::read(dest.path().join("a.bin")).unwrap(),
        [0x01, 0x02, 0x03, 0x04, 0x05]
    );
    assert!(
        receiver_sink
            .lines()
            .iter()
            .any(|l| l == "Reception complete, resetting WiFi and exiting.")
    );
    assert!(
        sender_sink
            .lines()
            .iter()
            .any(|l| l == "Send complete, resetting WiFi and exiting.")
    );
    assert_eq!(receiver_sink.percents().last(), Some(&100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_files_with_one_empty() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let x = patterned(100);
    let z = patterned(2 * 1024 * 1024);
    let paths = vec![
        make_file(src.path(), "x.bin", &x),
        make_file(src.path(), "y.bin", b""),
        make_file(src.path(), "z.bin", &z),
    ];

    let slot = Arc::new(Mutex::new(None));
    let sender_sink = RecorderSink::new(slot.clone());
    let receiver_sink = RecorderSink::new(slot);

    let (sent, received, sender_restores, receiver_restores) = run_pair(
        24032,
        paths,
        dest.path(),
        sender_sink,
        receiver_sink.clone(),
        CancellationToken::new(),
        CancellationToken::new(),
    )
    .await;

    sent.unwrap();
    received.unwrap();
    assert_eq!(sender_restores, 1);
    assert_eq!(receiver_restores, 1);

    assert_eq!(std::fs::read(dest.path().join("x.bin")).unwrap(), x);
    assert_eq!(std::fs::read(dest.path().join("y.bin")).unwrap(), b"");
    assert_eq!(std::fs::read(dest.path().join("z.bin")).unwrap(), z);

    // One 100 % event per file.
    let hundreds = receiver_sink
        .percents()
        .iter()
        .filter(|p| **p == 100)
        .count();
    assert!(hundreds >= 3, "expected a 100% event per file");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_passphrase_mismatch() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = make_file(src.path(), "m.bin", &patterned(8 * 1024 * 1024));

    // The sender types a passphrase the receiver did not generate.
    let sender_sink = RecorderSink::new(preset_passphrase("aaaa"));
    let receiver_sink = RecorderSink::new(Arc::new(Mutex::new(None)));

    let (sent, received, sender_restores, receiver_restores) = run_pair(
        24033,
        vec![path],
        dest.path(),
        sender_sink,
        receiver_sink.clone(),
        CancellationToken::new(),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(received, Err(TransferError::Protocol(_))));
    assert!(matches!(sent, Err(TransferError::Network(_))));
    assert_eq!(sender_restores, 1);
    assert_eq!(receiver_restores, 1);

    // Failed receive leaves nothing behind.
    assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
    assert_eq!(
        receiver_sink.lines().last().map(String::as_str),
        Some("Aborting transfer.")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_mid_transfer_deletes_partial() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = make_file(src.path(), "big.bin", &patterned(20 * 1024 * 1024));

    let slot = Arc::new(Mutex::new(None));
    let receiver_cancel = CancellationToken::new();
    let sender_sink = RecorderSink::new(slot.clone());
    let receiver_sink = RecorderSink::cancelling_at(slot, 10, receiver_cancel.clone());

    let (_sent, received, sender_restores, receiver_restores) = run_pair(
        24034,
        vec![path],
        dest.path(),
        sender_sink,
        receiver_sink,
        CancellationToken::new(),
        receiver_cancel,
    )
    .await;

    assert!(matches!(received, Err(TransferError::Cancelled)));
    assert_eq!(sender_restores, 1);
    assert_eq!(receiver_restores, 1);
    assert_eq!(
        std::fs::read_dir(dest.path()).unwrap().count(),
        0,
        "partial file not deleted"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dial_timeout_returns_network_error() {
    let src = TempDir::new().unwrap();
    let path = make_file(src.path(), "d.bin", &[7; 16]);

    let restores = Arc::new(AtomicUsize::new(0));
    let engine = TransferEngine::new(StubWifi::new(restores.clone()));
    let sink = RecorderSink::new(preset_passphrase("abcd"));

    let mut cfg = config(
        Mode::Send(vec![path]),
        24035, // nothing listens here
        sink.clone(),
        CancellationToken::new(),
    );
    cfg.timeouts = Timeouts {
        dial: Duration::from_secs(2),
        ..Timeouts::default()
    };

    let result = engine.run(cfg).await;

    assert!(matches!(result, Err(TransferError::Network(_))));
    assert_eq!(restores.load(Ordering::SeqCst), 1);
    assert_eq!(
        sink.lines().last().map(String::as_str),
        Some("Aborting transfer.")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_receiver_still_restores() {
    let dest = TempDir::new().unwrap();

    let restores = Arc::new(AtomicUsize::new(0));
    let engine = TransferEngine::new(StubWifi::new(restores.clone()));
    let sink = RecorderSink::new(Arc::new(Mutex::new(None)));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = engine
        .run(config(
            Mode::Receive(dest.path().to_path_buf()),
            24036,
            sink,
            cancel,
        ))
        .await;

    assert!(matches!(result, Err(TransferError::Cancelled)));
    assert_eq!(restores.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wifi_join_failure_still_restores() {
    let src = TempDir::new().unwrap();
    let path = make_file(src.path(), "w.bin", &[1; 8]);

    let restores = Arc::new(AtomicUsize::new(0));
    let engine = TransferEngine::new(StubWifi::failing_join(restores.clone()));
    let sink = RecorderSink::new(preset_passphrase("abcd"));

    let result = engine
        .run(config(
            Mode::Send(vec![path]),
            24037,
            sink.clone(),
            CancellationToken::new(),
        ))
        .await;

    assert!(matches!(result, Err(TransferError::Wifi(_))));
    assert_eq!(restores.load(Ordering::SeqCst), 1);
    assert_eq!(
        sink.lines().last().map(String::as_str),
        Some("Aborting transfer.")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_source_file_fails_before_bringup() {
    let restores = Arc::new(AtomicUsize::new(0));
    let engine = TransferEngine::new(StubWifi::new(restores.clone()));
    let sink = RecorderSink::new(preset_passphrase("abcd"));

    let result = engine
        .run(config(
            Mode::Send(vec![PathBuf::from("/nonexistent/nope.bin")]),
            24038,
            sink,
            CancellationToken::new(),
        ))
        .await;

    assert!(matches!(result, Err(TransferError::LocalIo(_))));
    // Prepare failed before the network was captured, so there was
    // nothing to restore.
    assert_eq!(restores.load(Ordering::SeqCst), 0);
}
