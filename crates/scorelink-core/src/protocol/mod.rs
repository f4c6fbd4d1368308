//! Protocol module containing the tagged-text message formats, the binary
//! chunk header, and score-field parsing.

pub mod chunk;
pub mod messages;
pub mod score;

pub use chunk::{parse_chunk_header, ChunkHeader, CHUNK_HEADER_LEN, MAX_CHUNK_SIZE};
pub use messages::*;
pub use score::ScoreUpdate;
