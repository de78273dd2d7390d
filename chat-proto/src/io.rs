//! Read and write extension traits for the primitive fields used by [`crate::event`].
//!
//! Every string field on the wire is a 4-byte big-endian length followed by that many
//! UTF-8 bytes; every other length (entity counts, frame sizes) uses the same 4-byte
//! big-endian encoding. These traits keep that repetition out of the codec itself.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};

use crate::error::ProtocolError;

/// Extension trait with the chat protocol's field-level read methods.
pub trait ReadChatExt: Read {
    #[inline]
    fn read_chat_u32(&mut self) -> io::Result<u32> {
        ReadBytesExt::read_u32::<BE>(self)
    }

    /// Read a length-prefixed UTF-8 string with no cap beyond `u32::MAX`.
    fn read_chat_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_chat_u32()? as usize;
        let mut raw = vec![0u8; len];
        self.read_exact(&mut raw).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ProtocolError::TruncatedFrame,
            _ => ProtocolError::Io(e),
        })?;
        String::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

impl<R: Read + ?Sized> ReadChatExt for R {}

/// Extension trait with the chat protocol's field-level write methods.
pub trait WriteChatExt: Write {
    #[inline]
    fn write_chat_u32(&mut self, value: u32) -> io::Result<()> {
        WriteBytesExt::write_u32::<BE>(self, value)
    }

    fn write_chat_string(&mut self, value: &str) -> io::Result<()> {
        self.write_chat_u32(value.len() as u32)?;
        self.write_all(value.as_bytes())
    }
}

impl<W: Write + ?Sized> WriteChatExt for W {}
