//! Media update use case: runs one sync engine per media category against a
//! discovered server and reports outcomes to the display sink.

use std::path::PathBuf;
use std::sync::{atomic::AtomicBool, Arc};

use scorelink_core::protocol::messages::CandidateEndpoint;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::score_channel::{DisplaySink, ScoreChannel};
use crate::infrastructure::storage::config::AppConfig;
use crate::infrastructure::sync::{FileSyncEngine, SyncEvent, SyncOutcome};

/// One media category resolved against the configured media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    pub name: String,
    pub port: u16,
    pub dir: PathBuf,
    pub extensions: Vec<String>,
}

impl MediaTarget {
    /// Builds the target list from the configuration.
    pub fn from_config(config: &AppConfig) -> Vec<MediaTarget> {
        let root = PathBuf::from(&config.display.media_root);
        config
            .media
            .iter()
            .map(|category| MediaTarget {
                name: category.name.clone(),
                port: category.port,
                dir: root.join(&category.dir),
                extensions: category.extensions.clone(),
            })
            .collect()
    }
}

/// Runs every media category's sync session in sequence. The categories are
/// independent services on independent ports; a failure in one is reported
/// as a status line and does not stop the others.
pub struct UpdateMediaUseCase {
    targets: Vec<MediaTarget>,
    scheme: String,
}

impl UpdateMediaUseCase {
    pub fn new(targets: Vec<MediaTarget>, scheme: impl Into<String>) -> Self {
        Self {
            targets,
            scheme: scheme.into(),
        }
    }

    /// Synchronizes every category against `host`. Returns how many
    /// categories completed cleanly.
    pub async fn run_all<S: DisplaySink>(
        &self,
        host: &str,
        interrupt: Arc<AtomicBool>,
        channel: &ScoreChannel<S>,
    ) -> usize {
        let mut succeeded = 0;

        for target in &self.targets {
            let (events_tx, events_rx) = mpsc::channel(64);
            let mut engine = FileSyncEngine::new(Arc::clone(&interrupt), events_tx);

            if let Err(e) = engine.set_destination(&target.dir, &target.extensions) {
                warn!("media {}: {e}", target.name);
                channel.handle_status(&format!("media {}: {e}", target.name));
                continue;
            }

            let endpoint = CandidateEndpoint {
                scheme: self.scheme.clone(),
                host: host.to_string(),
                port: target.port,
            };

            let drain = spawn_event_logger(target.name.clone(), events_rx);
            let outcome = engine.start_update(&endpoint).await;
            drop(engine); // closes the event channel so the logger ends
            let _ = drain.await;

            match outcome {
                Ok(SyncOutcome::NothingToSync) => {
                    debug!("media {}: nothing to sync", target.name);
                    succeeded += 1;
                    channel.handle_media_ready(&target.name);
                }
                Ok(SyncOutcome::Completed { transferred }) => {
                    debug!("media {}: complete ({transferred} transferred)", target.name);
                    succeeded += 1;
                    channel.handle_media_ready(&target.name);
                }
                Err(e) => {
                    warn!("media {} sync failed: {e}", target.name);
                    channel.handle_status(&format!("media {} sync failed: {e}", target.name));
                }
            }
        }

        succeeded
    }
}

/// Logs per-file progress while a session runs.
fn spawn_event_logger(
    category: String,
    mut events: mpsc::Receiver<SyncEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::FileCompleted { name, size } => {
                    debug!("media {category}: fetched {name} ({size} bytes)");
                }
                SyncEvent::FileSkipped { name } => {
                    warn!("media {category}: skipped {name}");
                }
                SyncEvent::Deleted { name } => {
                    debug!("media {category}: deleted {name}");
                }
                other => debug!("media {category}: {other:?}"),
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
