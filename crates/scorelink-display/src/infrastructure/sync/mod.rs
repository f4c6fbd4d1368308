//! Resumable chunked file synchronization against one media sync port.
//!
//! Session shape:
//!
//! ```text
//! connect ──> <send_file_list>1</send_file_list>
//!         <── NoData                      (clean close: nothing to sync)
//!         <── <file_list>name;size,...</file_list>
//! diff against local directory ──> deletions + transfer queue
//!         ──> <get>{name},{offset},{262144}</get>      (queue's LAST entry)
//!         <── [1024-byte header][payload...]           (first batch of a file)
//!         <── [payload...]                             (later batches)
//! ...until bytesReceived == declaredLength: rename temp over final, pop,
//! request the new last entry; empty queue ──> clean completion.
//! ```
//!
//! The engine exclusively owns its transfer state: one open connection, one
//! temp-file handle, one queue. Everything is driven by awaiting inbound
//! bytes — the suspension points are the connect call and each chunk
//! round trip. A batch is complete when the byte count expected for the
//! outstanding request has arrived; each socket read is one frame, and the
//! external interrupt flag is checked at every one of them.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use scorelink_core::domain::diff::{plan_sync, LocalFile, SyncPlan};
use scorelink_core::protocol::chunk::{parse_chunk_header, CHUNK_HEADER_LEN, MAX_CHUNK_SIZE};
use scorelink_core::protocol::messages::{
    chunk_request, parse_manifest_reply, CandidateEndpoint, ManifestReply, RemoteFileDescriptor,
    MANIFEST_REQUEST, NO_DATA,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Suffix of the temporary sibling a file is downloaded into before the
/// atomic rename over its final name.
pub const TEMP_SUFFIX: &str = ".part";

/// Errors terminating (or preventing) a sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The destination directory could not be created.
    #[error("failed to create destination directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection to the sync port failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A protocol or file-write failure that aborts the whole session.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The connection closed abnormally mid-session. Distinct from the two
    /// clean closures (nothing to sync, transfer complete).
    #[error("connection closed unexpectedly")]
    Disconnected,

    /// The external interruption flag was raised; the in-flight file was not
    /// finalized.
    #[error("sync interrupted")]
    Interrupted,
}

/// Progress events emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Connected { endpoint: String },
    ManifestReceived { remote_files: usize },
    Deleted { name: String },
    FileCompleted { name: String, size: u64 },
    FileSkipped { name: String },
}

/// How a session ended cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The server replied `NoData`; there is nothing in this category.
    NothingToSync,
    /// The diff was executed to the end. `transferred == 0` means every
    /// local file was already up to date — no chunk request was issued.
    Completed { transferred: usize },
}

/// Why a single file's transfer ended without completing.
enum FileFailure {
    /// The temp file could not be opened: abandon this file only.
    Skip(std::io::Error),
    /// The whole session must end.
    Fatal(SyncError),
}

/// Chunked file synchronization against one sync endpoint.
pub struct FileSyncEngine {
    dest_dir: Option<PathBuf>,
    extensions: Vec<String>,
    interrupt: Arc<AtomicBool>,
    events: mpsc::Sender<SyncEvent>,
}

impl FileSyncEngine {
    /// Creates an engine. `interrupt` terminates a running session at the
    /// next inbound frame; `events` receives progress notifications.
    pub fn new(interrupt: Arc<AtomicBool>, events: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            dest_dir: None,
            extensions: Vec::new(),
            interrupt,
            events,
        }
    }

    /// Sets the destination directory, creating it if absent, and the
    /// extension allow-list used to scope local directory scans.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Directory`] when the directory cannot be created.
    pub fn set_destination(
        &mut self,
        dir: impl Into<PathBuf>,
        extensions: &[String],
    ) -> Result<(), SyncError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SyncError::Directory {
            path: dir.clone(),
            source,
        })?;
        self.extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self.dest_dir = Some(dir);
        Ok(())
    }

    /// Runs one complete sync session against `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on connect failure, protocol failure, fatal
    /// write failure, abnormal disconnection, or interruption.
    pub async fn start_update(
        &mut self,
        endpoint: &CandidateEndpoint,
    ) -> Result<SyncOutcome, SyncError> {
        let dest = self
            .dest_dir
            .clone()
            .ok_or_else(|| SyncError::Transfer("destination not configured".to_string()))?;

        let mut stream = TcpStream::connect(endpoint.authority()).await.map_err(|source| {
            SyncError::Connect {
                endpoint: endpoint.address(),
                source,
            }
        })?;
        self.emit(SyncEvent::Connected {
            endpoint: endpoint.address(),
        })
        .await;

        send_request(&mut stream, MANIFEST_REQUEST).await?;

        let manifest = match self.read_manifest(&mut stream).await? {
            ManifestReply::NoData => {
                info!("server reports {NO_DATA}; nothing to sync into {}", dest.display());
                return Ok(SyncOutcome::NothingToSync);
            }
            ManifestReply::Files(files) => files,
        };
        self.emit(SyncEvent::ManifestReceived {
            remote_files: manifest.len(),
        })
        .await;

        let local = scan_local(&dest, &self.extensions)
            .map_err(|e| SyncError::Transfer(format!("local scan failed: {e}")))?;
        let SyncPlan {
            mut queue,
            deletions,
        } = plan_sync(&manifest, &local);

        for name in deletions {
            match fs::remove_file(dest.join(&name)) {
                Ok(()) => {
                    debug!("deleted stale file {name}");
                    self.emit(SyncEvent::Deleted { name }).await;
                }
                Err(e) => warn!("could not delete stale file {name}: {e}"),
            }
        }

        if queue.is_empty() {
            info!("all files up to date in {}", dest.display());
            return Ok(SyncOutcome::Completed { transferred: 0 });
        }

        let mut transferred = 0;
        // The queue is a stack: always operate on the LAST entry, then
        // remove it. Entries leave only on completion or per-file failure.
        while let Some(entry) = queue.last().cloned() {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(SyncError::Interrupted);
            }
            match self.transfer_file(&mut stream, &dest, &entry).await {
                Ok(()) => {
                    queue.pop();
                    transferred += 1;
                    self.emit(SyncEvent::FileCompleted {
                        name: entry.name,
                        size: entry.size,
                    })
                    .await;
                }
                Err(FileFailure::Skip(e)) => {
                    warn!("skipping {}: could not open temp file: {e}", entry.name);
                    queue.pop();
                    self.emit(SyncEvent::FileSkipped { name: entry.name }).await;
                }
                Err(FileFailure::Fatal(e)) => return Err(e),
            }
        }

        info!("transfer complete: {transferred} file(s) into {}", dest.display());
        Ok(SyncOutcome::Completed { transferred })
    }

    /// Pulls one file in bounded chunks and finalizes it atomically.
    async fn transfer_file(
        &self,
        stream: &mut TcpStream,
        dest: &Path,
        entry: &RemoteFileDescriptor,
    ) -> Result<(), FileFailure> {
        // Running payload byte count; doubles as the next request offset.
        let mut received: u64 = 0;
        let mut declared = entry.size;
        let mut temp: Option<File> = None;
        let mut temp_path = dest.join(format!("{}{TEMP_SUFFIX}", entry.name));
        let mut final_path = dest.join(&entry.name);
        // Header bytes accumulate here until the full region has arrived.
        let mut header_buf: Vec<u8> = Vec::new();

        loop {
            let request = chunk_request(&entry.name, received, MAX_CHUNK_SIZE);
            send_request(stream, &request)
                .await
                .map_err(FileFailure::Fatal)?;

            let header_len = if received == 0 {
                CHUNK_HEADER_LEN as u64
            } else {
                0
            };
            let mut expected = header_len + (declared - received).min(MAX_CHUNK_SIZE as u64);
            let mut batch_received: u64 = 0;

            while batch_received < expected {
                // Cancellation is honored at every inbound-frame point:
                // close the connection, release the temp handle, and return
                // without finalizing the in-flight file.
                if self.interrupt.load(Ordering::Relaxed) {
                    return Err(FileFailure::Fatal(SyncError::Interrupted));
                }

                let mut buf = vec![0u8; 64 * 1024];
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|_| FileFailure::Fatal(SyncError::Disconnected))?;
                if n == 0 {
                    return Err(FileFailure::Fatal(SyncError::Disconnected));
                }
                batch_received += n as u64;
                let mut frame: &[u8] = &buf[..n];

                if received == 0 && temp.is_none() {
                    // Still inside the fixed header region of the file's
                    // first batch.
                    header_buf.extend_from_slice(frame);
                    if header_buf.len() < CHUNK_HEADER_LEN {
                        continue;
                    }
                    let header = parse_chunk_header(&header_buf).map_err(|e| {
                        FileFailure::Fatal(SyncError::Transfer(format!("bad chunk header: {e}")))
                    })?;
                    // The header's declared length is authoritative from here
                    // on; re-derive the batch size in case it disagrees with
                    // the manifest entry.
                    declared = header.declared_len;
                    expected = CHUNK_HEADER_LEN as u64 + declared.min(MAX_CHUNK_SIZE as u64);
                    final_path = dest.join(&header.file_name);
                    temp_path = dest.join(format!("{}{TEMP_SUFFIX}", header.file_name));

                    // A stale output or a leftover temp from a prior aborted
                    // transfer must not survive into this one.
                    let _ = fs::remove_file(&final_path);
                    let _ = fs::remove_file(&temp_path);

                    let mut file = match OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&temp_path)
                    {
                        Ok(file) => file,
                        Err(e) => {
                            // The rest of this batch is still in flight;
                            // drain it so the next queued entry's request is
                            // answered on a clean stream.
                            drain_batch(stream, expected - batch_received)
                                .await
                                .map_err(FileFailure::Fatal)?;
                            return Err(FileFailure::Skip(e));
                        }
                    };

                    // Bytes past the header region belong to the payload.
                    let remainder = header_buf.split_off(CHUNK_HEADER_LEN);
                    received += write_checked(&mut file, &remainder)?;
                    temp = Some(file);
                    frame = &[];
                }

                if !frame.is_empty() {
                    let file = temp.as_mut().ok_or_else(|| {
                        FileFailure::Fatal(SyncError::Transfer(
                            "payload frame before chunk header".to_string(),
                        ))
                    })?;
                    received += write_checked(file, frame)?;
                }
            }

            if received < declared {
                // Another chunk of the same file, picking up at the running
                // byte count.
                continue;
            }

            // Finalization happens only at exact equality.
            debug_assert_eq!(received, declared);
            drop(temp.take());
            fs::rename(&temp_path, &final_path).map_err(|e| {
                FileFailure::Fatal(SyncError::Transfer(format!(
                    "could not finalize {}: {e}",
                    final_path.display()
                )))
            })?;
            debug!("finalized {} ({declared} bytes)", final_path.display());
            return Ok(());
        }
    }

    /// Reads until the manifest reply is complete.
    async fn read_manifest(&self, stream: &mut TcpStream) -> Result<ManifestReply, SyncError> {
        let mut buf = Vec::new();
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(SyncError::Interrupted);
            }
            let mut chunk = [0u8; 4096];
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|_| SyncError::Disconnected)?;
            if n == 0 {
                return Err(SyncError::Disconnected);
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if text.trim() == NO_DATA || text.contains("</file_list>") {
                return parse_manifest_reply(&text).map_err(|e| SyncError::Transfer(e.to_string()));
            }
        }
    }

    async fn emit(&self, event: SyncEvent) {
        // A dropped receiver only means nobody is watching progress.
        let _ = self.events.send(event).await;
    }
}

/// Writes `data` and verifies the byte count. A mismatch between bytes
/// attempted and bytes written is a fatal write error for the session.
fn write_checked(file: &mut File, data: &[u8]) -> Result<u64, FileFailure> {
    if data.is_empty() {
        return Ok(0);
    }
    let written = file
        .write(data)
        .map_err(|e| FileFailure::Fatal(SyncError::Transfer(format!("write failed: {e}"))))?;
    if written != data.len() {
        return Err(FileFailure::Fatal(SyncError::Transfer(format!(
            "short write: {written} of {} bytes",
            data.len()
        ))));
    }
    Ok(written as u64)
}

/// Reads and discards `remaining` in-flight bytes of an abandoned batch.
async fn drain_batch(stream: &mut TcpStream, mut remaining: u64) -> Result<(), SyncError> {
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = stream
            .read(&mut buf[..want])
            .await
            .map_err(|_| SyncError::Disconnected)?;
        if n == 0 {
            return Err(SyncError::Disconnected);
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Sends one protocol request, verifying the byte count on the wire.
async fn send_request(stream: &mut TcpStream, text: &str) -> Result<(), SyncError> {
    let bytes = text.as_bytes();
    let sent = stream
        .write(bytes)
        .await
        .map_err(|_| SyncError::Disconnected)?;
    if sent != bytes.len() {
        return Err(SyncError::Transfer(format!(
            "short send: {sent} of {} bytes",
            bytes.len()
        )));
    }
    stream
        .flush()
        .await
        .map_err(|_| SyncError::Disconnected)?;
    Ok(())
}

/// Lists destination files matching the extension allow-list, with sizes.
fn scan_local(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let metadata = dir_entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let path = dir_entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        files.push(LocalFile {
            name: name.to_string(),
            size: metadata.len(),
        });
    }
    Ok(files)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
