//! Score channel dispatch and the presentation seam.
//!
//! Rendering is not this crate's business. Everything the scoreboard widgets
//! need — parsed score fields, formatted clock text, file-ready and status
//! notifications — crosses the [`DisplaySink`] trait, and nothing else does.
//! The sink is the single place where the sync/protocol core meets the
//! presentation layer.

use std::sync::Mutex;

use scorelink_core::protocol::score::ScoreUpdate;
use tracing::{debug, info};

/// The presentation collaborator.
///
/// Implementations receive parsed values only; user-visible failure behavior
/// is limited to textual status updates via [`DisplaySink::on_status`] —
/// never a hard crash.
pub trait DisplaySink: Send + Sync {
    /// A score update arrived; absent fields are `None` and were not present
    /// in the payload.
    fn on_score(&self, update: &ScoreUpdate);

    /// The timer peripheral produced new clock text (`MM:SS` or `SS:HH`).
    fn on_clock_text(&self, text: &str);

    /// A media category finished synchronizing; its files are ready on disk.
    fn on_media_ready(&self, category: &str);

    /// A human-readable status line ("waiting for network", ...).
    fn on_status(&self, text: &str);
}

/// Sink that renders everything as log lines. The default until a real
/// widget layer is attached.
pub struct TextDisplaySink;

impl DisplaySink for TextDisplaySink {
    fn on_score(&self, update: &ScoreUpdate) {
        info!("score update: {update:?}");
    }

    fn on_clock_text(&self, text: &str) {
        info!("clock: {text}");
    }

    fn on_media_ready(&self, category: &str) {
        info!("media ready: {category}");
    }

    fn on_status(&self, text: &str) {
        info!("status: {text}");
    }
}

/// Recording sink for tests. Always compiled so integration tests on any
/// platform can assert on dispatch behavior.
#[derive(Default)]
pub struct MockDisplaySink {
    pub scores: Mutex<Vec<ScoreUpdate>>,
    pub clock_texts: Mutex<Vec<String>>,
    pub media_ready: Mutex<Vec<String>>,
    pub statuses: Mutex<Vec<String>>,
}

impl DisplaySink for MockDisplaySink {
    fn on_score(&self, update: &ScoreUpdate) {
        self.scores.lock().expect("scores lock").push(update.clone());
    }

    fn on_clock_text(&self, text: &str) {
        self.clock_texts
            .lock()
            .expect("clock lock")
            .push(text.to_string());
    }

    fn on_media_ready(&self, category: &str) {
        self.media_ready
            .lock()
            .expect("media lock")
            .push(category.to_string());
    }

    fn on_status(&self, text: &str) {
        self.statuses
            .lock()
            .expect("status lock")
            .push(text.to_string());
    }
}

/// Routes inbound payloads and component events to the sink.
pub struct ScoreChannel<S: DisplaySink> {
    sink: S,
}

impl<S: DisplaySink> ScoreChannel<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Parses one text payload and forwards it when it carries any known
    /// field. Payloads with no recognizable tags are dropped silently — an
    /// unknown message is "no data", not an error.
    pub fn handle_payload(&self, payload: &str) {
        let update = ScoreUpdate::parse(payload);
        if update.is_empty() {
            debug!("payload carried no known fields: {payload:?}");
            return;
        }
        self.sink.on_score(&update);
    }

    pub fn handle_clock_text(&self, text: &str) {
        self.sink.on_clock_text(text);
    }

    pub fn handle_media_ready(&self, category: &str) {
        self.sink.on_media_ready(category);
    }

    pub fn handle_status(&self, text: &str) {
        self.sink.on_status(text);
    }

    /// Access to the sink for composition with other use cases.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
