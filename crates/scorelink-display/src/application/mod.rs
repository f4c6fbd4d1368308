//! Application layer: use cases wiring the protocol core to the
//! presentation collaborator.

pub mod score_channel;
pub mod update_media;

pub use score_channel::{DisplaySink, MockDisplaySink, ScoreChannel, TextDisplaySink};
pub use update_media::{MediaTarget, UpdateMediaUseCase};
