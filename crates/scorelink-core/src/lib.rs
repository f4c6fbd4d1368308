//! # scorelink-core
//!
//! Shared library for ScoreLink containing the tagged-text wire formats, the
//! manifest diff logic, and the timer peripheral frame codec.
//!
//! This crate is used by the display client and by any tooling that speaks
//! the scoreboard server's protocols. It has zero dependencies on sockets,
//! serial ports, or the filesystem.
//!
//! # Architecture overview (for beginners)
//!
//! A ScoreLink display is a screen on the gym wall. It finds the scoreboard
//! server on the local network, mirrors the server's media files (team logos,
//! sponsor slides) onto local disk, and shows live scores. Optionally a
//! physical stopwatch-style timer is attached over a serial cable.
//!
//! This crate (`scorelink-core`) is the shared foundation. It defines:
//!
//! - **`protocol`** – How bytes travel over the network. Discovery, manifest,
//!   and score messages are short tagged-text strings (`<tag>value</tag>`);
//!   file chunks carry a fixed-size binary header.
//!
//! - **`domain`** – Pure business logic with no OS dependencies. The central
//!   piece is the sync plan: which remote files need fetching and which local
//!   files are stale.
//!
//! - **`timer`** – The byte-stuffed framing used by the serial timer
//!   peripheral, and the clock-text formatting applied to its counter values.

pub mod domain;
pub mod protocol;
pub mod timer;

// Re-export the most-used types at the crate root so callers can write
// `scorelink_core::SyncPlan` instead of `scorelink_core::domain::diff::SyncPlan`.
pub use domain::diff::{plan_sync, LocalFile, SyncPlan};
pub use protocol::chunk::{parse_chunk_header, ChunkHeader, CHUNK_HEADER_LEN, MAX_CHUNK_SIZE};
pub use protocol::messages::{
    parse_manifest_reply, ManifestReply, ProtocolError, RemoteFileDescriptor,
};
pub use timer::command::{format_clock, CommandError, TimerCommand};
pub use timer::frame::{encode_frame, FrameBuffer, RawFrame};
