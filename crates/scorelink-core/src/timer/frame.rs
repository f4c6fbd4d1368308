//! Byte-stuffed framing for the serial timer peripheral.
//!
//! Wire format:
//! ```text
//! [start:0xFF][length:1][command:1][payload:N'][end:0xFE]
//! ```
//! The length byte counts every byte after the start marker — itself, the
//! command byte, the stuffed payload, and the end marker. Any payload byte
//! equal to a reserved marker value is preceded by the escape byte `0xFD`
//! during encoding, so `N'` may exceed the logical payload length.
//!
//! Decoding merges each escape byte with its successor back into the original
//! byte and compensates the reported frame length by subtracting 2 for the
//! two-byte escape overhead. The subtraction is applied once per decoded
//! frame, not once per escaped byte — this matches the peripheral firmware's
//! accounting, so both ends agree on the reported value. The decoded payload
//! bytes themselves always round-trip exactly.
//!
//! # Why byte stuffing? (for beginners)
//!
//! A serial line is a raw byte stream with no packet boundaries, so the
//! protocol reserves marker values to delimit frames. When the payload
//! legitimately contains one of those values, the escape byte tells the
//! decoder "the next byte is data, not a marker". Without stuffing, a timer
//! value that happened to contain `0xFE` would truncate its own frame.

/// Marks the first byte of every frame.
pub const FRAME_START: u8 = 0xFF;

/// Marks the last byte of every frame.
pub const FRAME_END: u8 = 0xFE;

/// Precedes any payload byte that collides with a reserved marker value.
pub const FRAME_ESCAPE: u8 = 0xFD;

/// True for byte values that must be escaped inside a payload.
fn is_reserved(byte: u8) -> bool {
    matches!(byte, FRAME_START | FRAME_END | FRAME_ESCAPE)
}

/// One decoded frame: command byte, unstuffed payload, and the length the
/// frame reported after escape compensation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// The command byte as sent by the peripheral.
    pub command: u8,
    /// Payload with all escape sequences merged back to the original bytes.
    pub payload: Vec<u8>,
    /// The frame's length byte, minus 2 when the frame contained escapes.
    pub reported_len: u8,
}

/// Encodes `payload` into a complete frame for `command`.
pub fn encode_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut stuffed = Vec::with_capacity(payload.len());
    for &byte in payload {
        if is_reserved(byte) {
            stuffed.push(FRAME_ESCAPE);
        }
        stuffed.push(byte);
    }

    // length byte + command byte + stuffed payload + end marker
    let length = (stuffed.len() + 3) as u8;

    let mut frame = Vec::with_capacity(stuffed.len() + 4);
    frame.push(FRAME_START);
    frame.push(length);
    frame.push(command);
    frame.extend_from_slice(&stuffed);
    frame.push(FRAME_END);
    frame
}

/// Rolling receive buffer that brackets frames out of a raw byte stream.
///
/// Bytes preceding the first start marker are discarded; an open frame with
/// no end marker yet simply waits for more bytes (an incomplete frame is
/// never an error). The buffer lives for the lifetime of an open port and is
/// cleared on reconnect.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drops all buffered bytes (reconnect, or before issuing a request whose
    /// reply must not be mixed with stale data).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Extracts the next complete frame, or `None` when no bracketed frame is
    /// buffered yet. Consumed bytes (including any garbage before the start
    /// marker) are removed, so repeated calls drain every frame already in
    /// the buffer.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        // Discard noise before the first start marker.
        match self.buf.iter().position(|&b| b == FRAME_START) {
            Some(0) => {}
            Some(i) => {
                self.buf.drain(..i);
            }
            None => {
                self.buf.clear();
                return None;
            }
        }

        // Need at least start + length + command before payload scanning.
        if self.buf.len() < 3 {
            return None;
        }

        let length = self.buf[1];
        let command = self.buf[2];

        // Unstuff the payload while scanning for the unescaped end marker.
        let mut payload = Vec::new();
        let mut escaped = false;
        let mut had_escape = false;
        let mut end_index = None;
        for (i, &byte) in self.buf.iter().enumerate().skip(3) {
            if escaped {
                payload.push(byte);
                escaped = false;
            } else if byte == FRAME_ESCAPE {
                escaped = true;
                had_escape = true;
            } else if byte == FRAME_END {
                end_index = Some(i);
                break;
            } else {
                payload.push(byte);
            }
        }

        let end = end_index?;
        self.buf.drain(..=end);

        let reported_len = if had_escape {
            length.saturating_sub(2)
        } else {
            length
        };

        Some(RawFrame {
            command,
            payload,
            reported_len,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
