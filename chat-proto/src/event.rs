//! The tagged event type that crosses the wire, and its codec.
//!
//! Each event serialises as `type_code(4B BE) || body`, where the body layout is
//! fixed per variant. MUTE and EMPTY are in-process-only: the dispatcher
//! synthesises them directly and they are never written to a socket, so encoding one
//! is a programmer error. KICK is dual-purpose — the dispatcher synthesises it
//! in-process to trigger removal, but the affected handler also sends it on to the
//! target socket so the client can observe its own removal and exit cleanly. SEND is
//! reserved for a future file-transfer revision and is likewise not serialisable yet.

use std::io::{Cursor, Read, Write};

use crate::error::ProtocolError;
use crate::io::{ReadChatExt, WriteChatExt};

/// Type code for each variant, matching the order events were first defined in.
mod code {
    pub const QUIT: u32 = 1;
    pub const KICK: u32 = 2;
    pub const SHUTDOWN: u32 = 3;
    pub const MUTE: u32 = 4;
    pub const EMPTY: u32 = 5;
    pub const SEND: u32 = 6;
    pub const WHISPER: u32 = 7;
    pub const LIST: u32 = 8;
    pub const SWITCH: u32 = 9;
    pub const MESSAGE: u32 = 10;
    pub const JOIN: u32 = 11;
}

/// A single tagged event, either received from or destined for a socket.
///
/// `Kick`, `Mute` and `Empty` also double as the server's in-process admin events
/// posted to a channel's event queue. Of the three, only `Kick` ever reaches a
/// socket; `Mute` and `Empty` (and the reserved `Send`) are rejected by [`Event::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A broadcast chat line. `name` must equal the sending handler's resolved name.
    Message { name: String, message: String },
    /// Sent by a client to leave its channel; echoed back by the server so the
    /// client's read loop can exit.
    Quit { name: String },
    /// A private message. `sender` -> `target`.
    Whisper {
        sender: String,
        target: String,
        message: String,
    },
    /// Request the roster of every channel on the server.
    List { requester: String },
    /// Client -> server: ask to move to `channel`. Server -> client: `channel` holds
    /// the destination port as a decimal string.
    Switch { name: String, channel: String },
    /// Server -> client: confirms admission to `channel`.
    Join { channel: String },
    /// Dispatcher-internal removal signal; also sent on to `target`'s socket so the
    /// client can print a removal notice and exit before the connection closes.
    Kick { target: String },
    /// Server -> client: the channel is shutting down.
    Shutdown,
    /// In-process only: toggle mute for `target`.
    Mute { target: String },
    /// In-process only: evict every member of a channel.
    Empty,
    /// Reserved for file transfer; not yet serialisable.
    Send,
}

impl Event {
    fn variant_name(&self) -> &'static str {
        match self {
            Event::Message { .. } => "MESSAGE",
            Event::Quit { .. } => "QUIT",
            Event::Whisper { .. } => "WHISPER",
            Event::List { .. } => "LIST",
            Event::Switch { .. } => "SWITCH",
            Event::Join { .. } => "JOIN",
            Event::Kick { .. } => "KICK",
            Event::Shutdown => "SHUTDOWN",
            Event::Mute { .. } => "MUTE",
            Event::Empty => "EMPTY",
            Event::Send => "SEND",
        }
    }

    /// Encode this event to its wire representation: `type_code || body`.
    ///
    /// Returns [`ProtocolError::NotSerialisable`] for `Mute`, `Empty` and `Send`,
    /// which never travel over a socket.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if matches!(self, Event::Mute { .. } | Event::Empty | Event::Send) {
            return Err(ProtocolError::NotSerialisable(self.variant_name()));
        }
        let mut buf = Vec::new();
        self.write(&mut buf).map_err(ProtocolError::Io)?;
        Ok(buf)
    }

    fn write(&self, w: &mut impl Write) -> std::io::Result<()> {
        match self {
            Event::Quit { name } => {
                w.write_chat_u32(code::QUIT)?;
                w.write_chat_string(name)?;
            }
            Event::Whisper {
                sender,
                target,
                message,
            } => {
                w.write_chat_u32(code::WHISPER)?;
                w.write_chat_string(sender)?;
                w.write_chat_string(target)?;
                w.write_chat_string(message)?;
            }
            Event::List { requester } => {
                w.write_chat_u32(code::LIST)?;
                w.write_chat_string(requester)?;
            }
            Event::Switch { name, channel } => {
                w.write_chat_u32(code::SWITCH)?;
                w.write_chat_string(name)?;
                w.write_chat_string(channel)?;
            }
            Event::Message { name, message } => {
                w.write_chat_u32(code::MESSAGE)?;
                w.write_chat_string(name)?;
                w.write_chat_string(message)?;
            }
            Event::Join { channel } => {
                w.write_chat_u32(code::JOIN)?;
                w.write_chat_string(channel)?;
            }
            Event::Shutdown => {
                w.write_chat_u32(code::SHUTDOWN)?;
            }
            Event::Kick { target } => {
                w.write_chat_u32(code::KICK)?;
                w.write_chat_string(target)?;
            }
            Event::Mute { .. } | Event::Empty | Event::Send => {
                unreachable!("checked by encode() before reaching write()")
            }
        }
        Ok(())
    }

    /// Decode a whole event body (the bytes following the outer frame length) as
    /// produced by [`Event::encode`].
    pub fn decode(body: &[u8]) -> Result<Event, ProtocolError> {
        let mut cursor = Cursor::new(body);
        Self::read(&mut cursor)
    }

    fn read(r: &mut impl Read) -> Result<Event, ProtocolError> {
        let type_code = r.read_chat_u32().map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ProtocolError::TruncatedFrame,
            _ => ProtocolError::Io(e),
        })?;
        Ok(match type_code {
            code::QUIT => Event::Quit {
                name: r.read_chat_string()?,
            },
            code::WHISPER => Event::Whisper {
                sender: r.read_chat_string()?,
                target: r.read_chat_string()?,
                message: r.read_chat_string()?,
            },
            code::LIST => Event::List {
                requester: r.read_chat_string()?,
            },
            code::SWITCH => Event::Switch {
                name: r.read_chat_string()?,
                channel: r.read_chat_string()?,
            },
            code::MESSAGE => Event::Message {
                name: r.read_chat_string()?,
                message: r.read_chat_string()?,
            },
            code::JOIN => Event::Join {
                channel: r.read_chat_string()?,
            },
            code::SHUTDOWN => Event::Shutdown,
            code::KICK => Event::Kick {
                target: r.read_chat_string()?,
            },
            code::MUTE | code::EMPTY | code::SEND => {
                // These codes are never written to a socket by this implementation,
                // but a hostile peer could still send them; decode structurally so
                // callers can reject them instead of desyncing the stream.
                return Err(ProtocolError::UnknownEventCode(type_code));
            }
            other => return Err(ProtocolError::UnknownEventCode(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(event: Event) {
        let bytes = event.encode().expect("serialisable");
        let decoded = Event::decode(&bytes).expect("decodable");
        assert_eq!(event, decoded);
    }

    #[test]
    fn roundtrips_every_serialisable_variant() {
        roundtrip(Event::Message {
            name: "a".into(),
            message: "hello".into(),
        });
        roundtrip(Event::Quit { name: "a".into() });
        roundtrip(Event::Whisper {
            sender: "a".into(),
            target: "b".into(),
            message: "hi".into(),
        });
        roundtrip(Event::List {
            requester: "a".into(),
        });
        roundtrip(Event::Switch {
            name: "a".into(),
            channel: "9002".into(),
        });
        roundtrip(Event::Join {
            channel: "core".into(),
        });
        roundtrip(Event::Shutdown);
        roundtrip(Event::Kick { target: "a".into() });
    }

    #[test]
    fn rejects_in_process_only_variants() {
        assert!(matches!(
            Event::Mute { target: "a".into() }.encode(),
            Err(ProtocolError::NotSerialisable("MUTE"))
        ));
        assert!(matches!(
            Event::Empty.encode(),
            Err(ProtocolError::NotSerialisable("EMPTY"))
        ));
        assert!(matches!(
            Event::Send.encode(),
            Err(ProtocolError::NotSerialisable("SEND"))
        ));
    }

    #[test]
    fn rejects_unknown_type_code() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&999u32.to_be_bytes());
        assert!(matches!(
            Event::decode(&bytes),
            Err(ProtocolError::UnknownEventCode(999))
        ));
    }

    #[test]
    fn rejects_truncated_body() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&code::MESSAGE.to_be_bytes());
        bytes.extend_from_slice(&5u32.to_be_bytes()); // claims a 5-byte name
        bytes.extend_from_slice(b"ab"); // but only provides 2
        assert!(matches!(
            Event::decode(&bytes),
            Err(ProtocolError::TruncatedFrame)
        ));
    }

    #[test]
    fn stream_decoder_splits_concatenated_frames() {
        use crate::framing;
        let mut buf = Vec::new();
        framing::write_frame(
            &mut buf,
            &Event::Message {
                name: "a".into(),
                message: "one".into(),
            },
        )
        .unwrap();
        framing::write_frame(&mut buf, &Event::Quit { name: "a".into() }).unwrap();

        let mut cursor = Cursor::new(buf);
        let first = framing::read_frame(&mut cursor).unwrap().unwrap();
        let second = framing::read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(
            first,
            Event::Message {
                name: "a".into(),
                message: "one".into()
            }
        );
        assert_eq!(second, Event::Quit { name: "a".into() });
    }
}
