//! scorelink-display library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/` and
//! the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the display client do? (for beginners)
//!
//! A ScoreLink display hangs on the gym wall and mirrors the scoreboard
//! server. It has no configuration UI of its own, so everything it needs must
//! be found or fetched:
//!
//! 1. Wait until a usable network interface exists.
//! 2. Broadcast a discovery request on every qualifying interface and collect
//!    the server addresses that answer.
//! 3. Mirror the server's media files (team logos, slideshow images) into
//!    local directories, fetching them in bounded chunks so a lost connection
//!    wastes at most one chunk.
//! 4. Open the score channel and forward parsed score fields to the
//!    presentation layer.
//! 5. Optionally handshake with a serial timer peripheral and convert its
//!    counter frames into clock text.

/// Application layer: use cases for the display.
pub mod application;

/// Infrastructure layer: sockets, serial port, sync engine, and config.
pub mod infrastructure;
