//! The client side of the greeting handshake and the single-writer socket handle
//! shared between the command loop and the reader thread.
//!
//! A `/switch` replaces the underlying socket in place (see [`Connection::replace`])
//! so the command loop never needs to know a reconnect happened.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use chat_proto::{framing, Event, ProtocolError};

/// Bound on the unframed handshake reply: large enough for any channel name allowed
/// by the config-file grammar, small enough not to block forever on a silent peer.
const MAX_REJECTION_BYTES: usize = 256;

/// Outcome of a handshake attempt against a channel's listener.
pub enum Handshake {
    Admitted(TcpStream),
    /// The name collided in that channel; carries the channel name the server sent
    /// back so the caller can print the exact rejection template.
    Rejected(String),
}

/// Connect to `port` on localhost and perform the pre-framed name handshake.
pub fn connect_and_handshake(port: u16, name: &str) -> std::io::Result<Handshake> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))?;
    stream.write_all(name.as_bytes())?;

    // The admit reply is exactly the one byte `b"Y"`; anything else is the rejecting
    // channel's name. Reading one byte first (rather than into a fixed buffer) means
    // any bytes the server writes right after an admit (the JOIN frame, a queue
    // notice) stay buffered for the framed read loop instead of being swallowed here.
    let mut first = [0u8; 1];
    stream.read_exact(&mut first)?;
    if first == *b"Y" {
        return Ok(Handshake::Admitted(stream));
    }

    let mut rest = vec![first[0]];
    let mut chunk = [0u8; MAX_REJECTION_BYTES];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                rest.extend_from_slice(&chunk[..n]);
                if rest.len() >= MAX_REJECTION_BYTES {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    let channel = String::from_utf8_lossy(&rest).into_owned();
    Ok(Handshake::Rejected(channel))
}

/// The single writer for the client's current socket. A `/switch` swaps the inner
/// stream; every other command path just calls [`Connection::send`].
pub struct Connection {
    writer: Mutex<TcpStream>,
}

impl Connection {
    pub fn new(writer: TcpStream) -> Self {
        Connection {
            writer: Mutex::new(writer),
        }
    }

    pub fn send(&self, event: &Event) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().unwrap();
        framing::write_frame(&mut *writer, event)
    }

    pub fn replace(&self, stream: TcpStream) {
        *self.writer.lock().unwrap() = stream;
    }
}
