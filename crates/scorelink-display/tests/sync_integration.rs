//! Integration tests for the file sync engine against a loopback stub of the
//! scoreboard server's sync service.
//!
//! The stub speaks the real wire protocol: it answers the manifest request
//! with a configured reply and serves `<get>` requests from in-memory file
//! contents, prefixing the 1024-byte header on offset-0 responses. Every
//! chunk request is recorded so tests can assert on request ordering and on
//! the zero-request guarantees of the clean-closure paths.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{
    atomic::AtomicBool,
    Arc, Mutex,
};

use scorelink_core::protocol::chunk::encode_chunk_header;
use scorelink_core::protocol::messages::CandidateEndpoint;
use scorelink_display::infrastructure::sync::{FileSyncEngine, SyncError, SyncOutcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A one-connection stub sync service.
struct StubServer {
    port: u16,
    /// Raw `<get>` request bodies (`name,offset,chunk`) in arrival order.
    chunk_requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    async fn start(manifest_reply: &str, files: Vec<(&str, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let port = listener.local_addr().unwrap().port();
        let chunk_requests = Arc::new(Mutex::new(Vec::new()));

        let manifest_reply = manifest_reply.to_string();
        let files: HashMap<String, Vec<u8>> = files
            .into_iter()
            .map(|(name, data)| (name.to_string(), data))
            .collect();
        let requests = Arc::clone(&chunk_requests);

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 4096];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();

                if text.contains("<send_file_list>") {
                    if socket.write_all(manifest_reply.as_bytes()).await.is_err() {
                        return;
                    }
                } else if let Some(body) = extract(&text, "get") {
                    requests.lock().unwrap().push(body.clone());
                    let response = build_chunk_response(&files, &body);
                    if socket.write_all(&response).await.is_err() {
                        return;
                    }
                }
            }
        });

        Self {
            port,
            chunk_requests,
        }
    }

    fn endpoint(&self) -> CandidateEndpoint {
        CandidateEndpoint::new("127.0.0.1", self.port)
    }

    fn requests(&self) -> Vec<String> {
        self.chunk_requests.lock().unwrap().clone()
    }
}

fn extract(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].to_string())
}

/// Builds the `[header][payload]` response for one `name,offset,chunk` body.
fn build_chunk_response(files: &HashMap<String, Vec<u8>>, body: &str) -> Vec<u8> {
    let mut parts = body.rsplitn(3, ',');
    let chunk: usize = parts.next().unwrap().parse().unwrap();
    let offset: usize = parts.next().unwrap().parse().unwrap();
    let name = parts.next().unwrap();

    let data = files.get(name).expect("requested unknown file");
    let end = (offset + chunk).min(data.len());

    let mut response = Vec::new();
    if offset == 0 {
        response.extend_from_slice(&encode_chunk_header(name, data.len() as u64));
    }
    response.extend_from_slice(&data[offset..end]);
    response
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scorelink_it_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn make_engine(interrupted: bool) -> FileSyncEngine {
    let (events_tx, mut events_rx) = mpsc::channel(64);
    // Drain progress events so the engine never blocks on a full channel.
    tokio::spawn(async move { while events_rx.recv().await.is_some() {} });
    FileSyncEngine::new(Arc::new(AtomicBool::new(interrupted)), events_tx)
}

// ── Full transfer in stack order ──────────────────────────────────────────────

#[tokio::test]
async fn test_full_transfer_fetches_queue_in_stack_order() {
    // Arrange: two files, empty local directory
    let server = StubServer::start(
        "<file_list>a.jpg;100,b.jpg;200</file_list>",
        vec![("a.jpg", vec![0xAA; 100]), ("b.jpg", vec![0xBB; 200])],
    )
    .await;
    let dir = temp_dir();
    let mut engine = make_engine(false);
    engine
        .set_destination(&dir, &["jpg".to_string()])
        .unwrap();

    // Act
    let outcome = engine.start_update(&server.endpoint()).await.unwrap();

    // Assert
    assert_eq!(outcome, SyncOutcome::Completed { transferred: 2 });
    assert_eq!(fs::read(dir.join("a.jpg")).unwrap(), vec![0xAA; 100]);
    assert_eq!(fs::read(dir.join("b.jpg")).unwrap(), vec![0xBB; 200]);

    // The queue is a stack: the manifest's LAST entry is requested first,
    // each starting at offset 0.
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], "b.jpg,0,262144");
    assert_eq!(requests[1], "a.jpg,0,262144");

    // No temp siblings survive a completed session.
    assert!(!dir.join("a.jpg.part").exists());
    assert!(!dir.join("b.jpg.part").exists());

    fs::remove_dir_all(&dir).ok();
}

// ── NoData closes cleanly with zero chunk requests ────────────────────────────

#[tokio::test]
async fn test_no_data_reply_closes_cleanly_without_requests() {
    // Arrange
    let server = StubServer::start("NoData", vec![]).await;
    let dir = temp_dir();
    let mut engine = make_engine(false);
    engine.set_destination(&dir, &["jpg".to_string()]).unwrap();

    // Act
    let outcome = engine.start_update(&server.endpoint()).await.unwrap();

    // Assert
    assert_eq!(outcome, SyncOutcome::NothingToSync);
    assert!(server.requests().is_empty(), "NoData must not trigger chunks");

    fs::remove_dir_all(&dir).ok();
}

// ── Idempotence: up-to-date local set issues no network chunk requests ────────

#[tokio::test]
async fn test_up_to_date_local_set_is_idempotent() {
    // Arrange: local files already match the manifest exactly
    let server = StubServer::start(
        "<file_list>a.jpg;4,b.jpg;6</file_list>",
        vec![("a.jpg", b"aaaa".to_vec()), ("b.jpg", b"bbbbbb".to_vec())],
    )
    .await;
    let dir = temp_dir();
    fs::write(dir.join("a.jpg"), b"aaaa").unwrap();
    fs::write(dir.join("b.jpg"), b"bbbbbb").unwrap();
    let mut engine = make_engine(false);
    engine.set_destination(&dir, &["jpg".to_string()]).unwrap();

    // Act
    let outcome = engine.start_update(&server.endpoint()).await.unwrap();

    // Assert — clean "up to date" completion, zero chunk requests
    assert_eq!(outcome, SyncOutcome::Completed { transferred: 0 });
    assert!(server.requests().is_empty());

    fs::remove_dir_all(&dir).ok();
}

// ── Pruning: local files without an exact manifest match are deleted ──────────

#[tokio::test]
async fn test_stale_and_resized_local_files_are_pruned() {
    // Arrange: one retired file, one with a stale size
    let server = StubServer::start(
        "<file_list>keep.jpg;4,resized.jpg;8</file_list>",
        vec![
            ("keep.jpg", b"kkkk".to_vec()),
            ("resized.jpg", b"rrrrrrrr".to_vec()),
        ],
    )
    .await;
    let dir = temp_dir();
    fs::write(dir.join("keep.jpg"), b"kkkk").unwrap();
    fs::write(dir.join("resized.jpg"), b"old").unwrap(); // wrong size
    fs::write(dir.join("retired.jpg"), b"gone").unwrap(); // not in manifest
    let mut engine = make_engine(false);
    engine.set_destination(&dir, &["jpg".to_string()]).unwrap();

    // Act
    let outcome = engine.start_update(&server.endpoint()).await.unwrap();

    // Assert — the resized file was re-fetched in full, the retired one is gone
    assert_eq!(outcome, SyncOutcome::Completed { transferred: 1 });
    assert_eq!(fs::read(dir.join("resized.jpg")).unwrap(), b"rrrrrrrr");
    assert!(dir.join("keep.jpg").exists());
    assert!(!dir.join("retired.jpg").exists());

    fs::remove_dir_all(&dir).ok();
}

// ── Multi-chunk pull: offsets track the running byte count ────────────────────

#[tokio::test]
async fn test_large_file_is_pulled_in_bounded_chunks() {
    // Arrange: one file larger than the 262144-byte chunk bound
    let size = 300_000usize;
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let server = StubServer::start(
        &format!("<file_list>big.bin;{size}</file_list>"),
        vec![("big.bin", data.clone())],
    )
    .await;
    let dir = temp_dir();
    let mut engine = make_engine(false);
    engine.set_destination(&dir, &["bin".to_string()]).unwrap();

    // Act
    let outcome = engine.start_update(&server.endpoint()).await.unwrap();

    // Assert — two requests: offset 0, then offset == bytes received
    assert_eq!(outcome, SyncOutcome::Completed { transferred: 1 });
    let requests = server.requests();
    assert_eq!(
        requests,
        vec![
            "big.bin,0,262144".to_string(),
            "big.bin,262144,262144".to_string(),
        ]
    );
    assert_eq!(fs::read(dir.join("big.bin")).unwrap(), data);

    fs::remove_dir_all(&dir).ok();
}

// ── Leftover temp files from an aborted run are replaced ──────────────────────

#[tokio::test]
async fn test_leftover_temp_file_does_not_corrupt_refetch() {
    // Arrange: a stale .part sibling from a previous aborted transfer
    let server = StubServer::start(
        "<file_list>a.jpg;5</file_list>",
        vec![("a.jpg", b"fresh".to_vec())],
    )
    .await;
    let dir = temp_dir();
    fs::write(dir.join("a.jpg.part"), b"stale-partial-junk").unwrap();
    let mut engine = make_engine(false);
    engine.set_destination(&dir, &["jpg".to_string()]).unwrap();

    // Act
    let outcome = engine.start_update(&server.endpoint()).await.unwrap();

    // Assert — the stale temp was deleted, not appended to
    assert_eq!(outcome, SyncOutcome::Completed { transferred: 1 });
    assert_eq!(fs::read(dir.join("a.jpg")).unwrap(), b"fresh");
    assert!(!dir.join("a.jpg.part").exists());

    fs::remove_dir_all(&dir).ok();
}

// ── Cancellation: the interrupt flag stops the session without finalizing ─────

#[tokio::test]
async fn test_interrupt_flag_terminates_session() {
    // Arrange: interruption raised before the session starts
    let server = StubServer::start(
        "<file_list>a.jpg;4</file_list>",
        vec![("a.jpg", b"aaaa".to_vec())],
    )
    .await;
    let dir = temp_dir();
    let mut engine = make_engine(true);
    engine.set_destination(&dir, &["jpg".to_string()]).unwrap();

    // Act
    let result = engine.start_update(&server.endpoint()).await;

    // Assert — terminated without finalizing anything
    assert!(matches!(result, Err(SyncError::Interrupted)));
    assert!(!dir.join("a.jpg").exists());

    fs::remove_dir_all(&dir).ok();
}

// ── Abnormal disconnect is distinct from the clean closures ───────────────────

#[tokio::test]
async fn test_server_dropping_mid_manifest_reports_disconnect() {
    // Arrange: a server that accepts and immediately closes
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });
    let dir = temp_dir();
    let mut engine = make_engine(false);
    engine.set_destination(&dir, &["jpg".to_string()]).unwrap();

    // Act
    let result = engine
        .start_update(&CandidateEndpoint::new("127.0.0.1", port))
        .await;

    // Assert
    assert!(matches!(result, Err(SyncError::Disconnected)));

    fs::remove_dir_all(&dir).ok();
}
