//! Wire protocol shared by the chat server and client.
//!
//! An [`event::Event`] is the single tagged sum type that crosses the network. Every
//! event is framed on the wire as a 4-byte big-endian length followed by that many
//! serialised bytes (see [`framing`]); the serialised bytes themselves start with a
//! 4-byte big-endian type code (see [`event`]).

pub mod error;
pub mod event;
pub mod framing;
pub mod io;

pub use error::ProtocolError;
pub use event::Event;
