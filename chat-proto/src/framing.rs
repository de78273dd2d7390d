//! Length-prefixed framing around a single [`crate::Event`].
//!
//! ```text
//! +----+--------------------------+
//! | L  |    serialised event      |
//! +----+--------------------------+
//!   4B         L bytes
//! ```
//! `L` is the 4-byte big-endian length of the serialised event that follows
//! (exclusive of itself). This is the only place that knows about the outer length;
//! [`crate::event::Event`] only ever sees the bytes between the brackets.

use std::io::{Read, Write};

use crate::error::ProtocolError;
use crate::event::Event;
use crate::io::{ReadChatExt, WriteChatExt};

/// Write one framed event: 4-byte length followed by the serialised body.
pub fn write_frame(w: &mut impl Write, event: &Event) -> Result<(), ProtocolError> {
    let body = event.encode()?;
    w.write_chat_u32(body.len() as u32)?;
    w.write_all(&body)?;
    Ok(())
}

/// Write a pre-serialised, pre-framed blob: used for the raw handshake reply, which
/// has no outer length and is not itself an [`Event`].
pub fn write_raw(w: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    w.write_all(bytes)
}

/// Read one framed event from a stream.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before sending any
/// bytes of a new frame (the normal `PeerClosed` case). Returns
/// [`ProtocolError::TruncatedFrame`] if the peer closed mid-frame.
pub fn read_frame(r: &mut impl Read) -> Result<Option<Event>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ProtocolError::TruncatedFrame,
        _ => ProtocolError::Io(e),
    })?;
    Event::decode(&body).map(Some)
}
