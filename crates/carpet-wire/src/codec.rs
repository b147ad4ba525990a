//! File frame encoding and decoding.
//!
//! Send and receive are generic over the stream so the codec can be
//! exercised against in-memory pipes as well as TCP.

use crate::{CHUNK_SIZE, CodecError, MAX_FILENAME_LEN};
use carpet_crypto::{ChunkCipher, NONCE_SIZE, TAG_SIZE};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run one stream operation, racing it against cancellation.
///
/// A stalled peer must not be able to outlive a cancel: every read and
/// write on the wire goes through here so the next wait returns
/// `Cancelled` as soon as the token fires. The abandoned stream is never
/// used again afterwards.
async fn on_stream<F, T>(cancel: &CancellationToken, op: F) -> Result<T, CodecError>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        () = cancel.cancelled() => Err(CodecError::Cancelled),
        result = op => result.map_err(CodecError::Stream),
    }
}

/// Percentage tracker with duplicate suppression.
struct ProgressMeter<F: FnMut(u8)> {
    total: u64,
    done: u64,
    last: Option<u8>,
    emit: F,
}

impl<F: FnMut(u8)> ProgressMeter<F> {
    fn new(total: u64, emit: F) -> Self {
        Self {
            total,
            done: 0,
            last: None,
            emit,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self, bytes: u64) {
        self.done += bytes;
        let percent = if self.total == 0 {
            100
        } else {
            ((self.done * 100) / self.total) as u8
        };
        if self.last != Some(percent) {
            self.last = Some(percent);
            (self.emit)(percent);
        }
    }
}

/// Encode one file as a file frame onto the stream.
///
/// Reads the file sequentially in 1 MiB chunks, encrypts each chunk under
/// an incrementing counter nonce, and finishes with the SHA-256 of the
/// plaintext. Emits a progress percentage after every chunk, suppressing
/// duplicates; a zero-byte file emits a single 100 % event.
///
/// # Errors
///
/// Returns an error if file or stream I/O fails, encryption fails, or
/// cancellation is observed at a chunk boundary.
pub async fn send_file<S>(
    stream: &mut S,
    cipher: &ChunkCipher,
    path: &Path,
    cancel: &CancellationToken,
    on_progress: impl FnMut(u8),
) -> Result<(), CodecError>
where
    S: AsyncWrite + Unpin,
{
    let mut file = File::open(path).await.map_err(CodecError::File)?;
    let size = file.metadata().await.map_err(CodecError::File)?.len();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CodecError::Filename(path.display().to_string()))?;

    debug!(file = %name, size, "sending file frame");

    on_stream(cancel, stream.write_u64_le(size)).await?;
    on_stream(cancel, stream.write_u64_le(name.len() as u64)).await?;
    on_stream(cancel, stream.write_all(name.as_bytes())).await?;

    let mut hasher = Sha256::new();
    let mut meter = ProgressMeter::new(size, on_progress);
    let mut remaining = size;
    let mut counter = 0u64;

    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(CodecError::Cancelled);
        }

        let len = remaining.min(CHUNK_SIZE as u64) as usize;
        let mut plaintext = vec![0u8; len];
        file.read_exact(&mut plaintext)
            .await
            .map_err(CodecError::File)?;

        hasher.update(&plaintext);
        let (nonce, ciphertext) = cipher.seal(counter, &plaintext)?;

        on_stream(cancel, stream.write_u64_le(ciphertext.len() as u64)).await?;
        on_stream(cancel, stream.write_all(&nonce)).await?;
        on_stream(cancel, stream.write_all(&ciphertext)).await?;

        counter += 1;
        remaining -= len as u64;
        meter.advance(len as u64);
    }

    if size == 0 {
        meter.advance(0);
    }

    let digest = hasher.finalize();
    on_stream(cancel, stream.write_all(&digest)).await?;
    on_stream(cancel, stream.flush()).await?;

    Ok(())
}

/// Decode one file frame from the stream into `dest_dir`.
///
/// Length fields are bounds-checked before any allocation. The filename
/// must be a plain UTF-8 basename; an existing destination gets a ` (N)`
/// counter suffix rather than being overwritten. A failed or cancelled
/// receive deletes the partial output file before returning.
///
/// Returns the path the file was written to.
///
/// # Errors
///
/// Returns an error on malformed frames, decryption failure, hash
/// mismatch, I/O failure, or cancellation at a chunk boundary.
pub async fn recv_file<S>(
    stream: &mut S,
    cipher: &ChunkCipher,
    dest_dir: &Path,
    cancel: &CancellationToken,
    on_progress: impl FnMut(u8),
) -> Result<PathBuf, CodecError>
where
    S: AsyncRead + Unpin,
{
    let size = on_stream(cancel, stream.read_u64_le()).await?;
    let name_len = on_stream(cancel, stream.read_u64_le()).await?;
    if name_len == 0 || name_len > MAX_FILENAME_LEN {
        return Err(CodecError::FilenameLength(name_len));
    }

    let mut name_bytes = vec![0u8; name_len as usize];
    on_stream(cancel, stream.read_exact(&mut name_bytes)).await?;
    let name = String::from_utf8(name_bytes)
        .map_err(|_| CodecError::Filename("not valid UTF-8".to_string()))?;
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(CodecError::Filename(name));
    }

    debug!(file = %name, size, "receiving file frame");

    let dest = unique_destination(dest_dir, &name).await;
    let mut file = File::create(&dest).await.map_err(CodecError::File)?;

    let meter = ProgressMeter::new(size, on_progress);
    match recv_into(stream, cipher, &mut file, size, cancel, meter).await {
        Ok(()) => Ok(dest),
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(&dest).await;
            Err(e)
        }
    }
}

async fn recv_into<S, F>(
    stream: &mut S,
    cipher: &ChunkCipher,
    file: &mut File,
    size: u64,
    cancel: &CancellationToken,
    mut meter: ProgressMeter<F>,
) -> Result<(), CodecError>
where
    S: AsyncRead + Unpin,
    F: FnMut(u8),
{
    let mut hasher = Sha256::new();
    let mut remaining = size;

    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(CodecError::Cancelled);
        }

        let ciphertext_len = on_stream(cancel, stream.read_u64_le()).await?;
        if ciphertext_len < TAG_SIZE as u64 || ciphertext_len > (CHUNK_SIZE + TAG_SIZE) as u64 {
            return Err(CodecError::ChunkLength(ciphertext_len));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        on_stream(cancel, stream.read_exact(&mut nonce)).await?;
        let mut ciphertext = vec![0u8; ciphertext_len as usize];
        on_stream(cancel, stream.read_exact(&mut ciphertext)).await?;

        let plaintext = cipher.open(&nonce, &ciphertext)?;
        if plaintext.is_empty() {
            return Err(CodecError::EmptyChunk);
        }
        if plaintext.len() as u64 > remaining {
            return Err(CodecError::Overrun { declared: size });
        }

        hasher.update(&plaintext);
        file.write_all(&plaintext).await.map_err(CodecError::File)?;

        remaining -= plaintext.len() as u64;
        meter.advance(plaintext.len() as u64);
    }

    if size == 0 {
        meter.advance(0);
    }

    let mut expected = [0u8; 32];
    on_stream(cancel, stream.read_exact(&mut expected)).await?;
    if hasher.finalize().as_slice() != expected {
        return Err(CodecError::HashMismatch);
    }

    file.flush().await.map_err(CodecError::File)?;
    Ok(())
}

/// Pick a destination path that does not collide with an existing file.
///
/// `name.ext` becomes `name (1).ext`, `name (2).ext`, … as needed.
async fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let alt = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(alt);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}
