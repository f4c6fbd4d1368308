//! Timer peripheral protocol: byte-stuffed framing and command decoding.

pub mod command;
pub mod frame;

pub use command::{format_clock, CommandError, TimerCommand, TimerOpcode};
pub use frame::{encode_frame, FrameBuffer, RawFrame, FRAME_END, FRAME_ESCAPE, FRAME_START};
