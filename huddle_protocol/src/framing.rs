// Length-delimited framing for `WireMessage`s over byte streams.
//
// Stream transports (TCP) have no message boundaries, so each message goes out
// as a 4-byte big-endian length prefix followed by its JSON encoding.
// Datagram-style transports that already preserve boundaries (the in-process
// network) use `WireMessage::to_json` directly and skip this module.
//
// `MAX_FRAME_SIZE` (16 MB) bounds the allocation a malformed or hostile
// length prefix can trigger. Game state snapshots are the largest payloads.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::message::WireMessage;

/// Maximum encoded size of one message.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge(usize),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True when the peer closed the stream (cleanly or mid-frame).
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Encode `msg` and write it as one frame, then flush.
pub fn write_frame<W: Write>(writer: &mut W, msg: &WireMessage) -> Result<(), FrameError> {
    let body = msg.to_json()?;
    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(FrameError::TooLarge(body.len()));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len = (body.len() as u32).to_be_bytes();
    writer.write_all(&len)?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and decode it. Unknown message kinds decode to
/// `WireMessage::Unknown`; only broken JSON yields `FrameError::Malformed`.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<WireMessage, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len as usize));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(WireMessage::from_json(&body)?)
}
