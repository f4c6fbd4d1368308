//! Timer peripheral command set and clock-text formatting.
//!
//! The peripheral speaks four commands, carried in the command byte of each
//! frame. They are opaque device opcodes; the display treats them as an
//! enumerated tag set and dispatches by explicit match, never by raw value.

use thiserror::Error;

use crate::timer::frame::{encode_frame, RawFrame};

/// Errors produced while decoding a frame into a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command byte is not a recognized opcode.
    #[error("unknown timer opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// The payload is shorter than the command requires.
    #[error("short payload for {command:?}: need {needed} bytes, got {got}")]
    ShortPayload {
        command: TimerOpcode,
        needed: usize,
        got: usize,
    },
}

/// All opcodes defined by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerOpcode {
    AreYouThere = 0x01,
    Time = 0x02,
    Configure = 0x03,
    StopSending = 0x04,
}

impl TryFrom<u8> for TimerOpcode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(TimerOpcode::AreYouThere),
            0x02 => Ok(TimerOpcode::Time),
            0x03 => Ok(TimerOpcode::Configure),
            0x04 => Ok(TimerOpcode::StopSending),
            _ => Err(()),
        }
    }
}

/// A decoded peripheral command with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    /// Handshake probe and its reply.
    AreYouThere,
    /// Elapsed/remaining time as a counter of hundredths of a second.
    Time(u32),
    /// Device configuration bytes, passed through opaquely.
    Configure(Vec<u8>),
    /// Tells the peripheral to stop streaming time frames.
    StopSending,
}

impl TimerCommand {
    /// Decodes a bracketed frame into a typed command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] for unknown opcodes or a `Time` payload
    /// shorter than its 4-byte counter.
    pub fn decode(frame: &RawFrame) -> Result<Self, CommandError> {
        let opcode = TimerOpcode::try_from(frame.command)
            .map_err(|_| CommandError::UnknownOpcode(frame.command))?;

        match opcode {
            TimerOpcode::AreYouThere => Ok(TimerCommand::AreYouThere),
            TimerOpcode::Time => {
                if frame.payload.len() < 4 {
                    return Err(CommandError::ShortPayload {
                        command: TimerOpcode::Time,
                        needed: 4,
                        got: frame.payload.len(),
                    });
                }
                // 4-byte little-endian counter of hundredths of a second.
                let hundredths = u32::from_le_bytes([
                    frame.payload[0],
                    frame.payload[1],
                    frame.payload[2],
                    frame.payload[3],
                ]);
                Ok(TimerCommand::Time(hundredths))
            }
            TimerOpcode::Configure => Ok(TimerCommand::Configure(frame.payload.clone())),
            TimerOpcode::StopSending => Ok(TimerCommand::StopSending),
        }
    }

    /// The opcode for this command.
    pub fn opcode(&self) -> TimerOpcode {
        match self {
            TimerCommand::AreYouThere => TimerOpcode::AreYouThere,
            TimerCommand::Time(_) => TimerOpcode::Time,
            TimerCommand::Configure(_) => TimerOpcode::Configure,
            TimerCommand::StopSending => TimerOpcode::StopSending,
        }
    }

    /// Encodes this command as a complete frame ready to write to the port.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TimerCommand::AreYouThere => encode_frame(TimerOpcode::AreYouThere as u8, &[]),
            TimerCommand::Time(hundredths) => {
                encode_frame(TimerOpcode::Time as u8, &hundredths.to_le_bytes())
            }
            TimerCommand::Configure(bytes) => encode_frame(TimerOpcode::Configure as u8, bytes),
            TimerCommand::StopSending => encode_frame(TimerOpcode::StopSending as u8, &[]),
        }
    }
}

/// Formats a timer counter for the scoreboard clock.
///
/// Values above 6000 (60.00 s) get a 99-hundredths display bias before
/// division, so a running-down clock shows the ceiling of the remaining
/// seconds while in minute mode. Minutes render as `MM:SS`; under a minute
/// the display switches to `SS:HH` (seconds and hundredths).
pub fn format_clock(hundredths: u32) -> String {
    let biased = if hundredths > 6000 {
        hundredths + 99
    } else {
        hundredths
    };
    let minutes = biased / 6000;
    if minutes > 0 {
        format!("{:02}:{:02}", minutes, (biased / 100) % 60)
    } else {
        format!("{:02}:{:02}", biased / 100, biased % 100)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
