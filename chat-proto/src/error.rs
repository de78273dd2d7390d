//! Error type shared by the codec and the framing helpers.

use std::io;

use thiserror::Error;

/// Error produced while encoding or decoding an [`crate::event::Event`], or while
/// reading/writing the length-prefixed frame around it.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("unknown event type code {0}")]
    UnknownEventCode(u32),
    #[error("frame truncated before a complete event could be read")]
    TruncatedFrame,
    #[error("{0} is not serialisable on the wire")]
    NotSerialisable(&'static str),
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
}
