//! The connection handler (C2): the server-side object bridging one TCP socket to
//! one channel.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chat_proto::{framing, Event, ProtocolError};

/// One accepted client connection. `name` is resolved during the handshake and never
/// changes afterwards — a name change is a reconnect (new `Handler`), not a mutation
/// of this one.
pub struct Handler {
    pub name: String,
    writer: Mutex<TcpStream>,
    pub joined: AtomicBool,
    pub muted: AtomicBool,
    pub running: AtomicBool,
}

impl Handler {
    pub fn new(name: String, writer: TcpStream) -> Self {
        Handler {
            name,
            writer: Mutex::new(writer),
            joined: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    /// Send one framed event to this handler's socket. The write lock is the single
    /// writer for this socket, so frames from concurrent broadcasters never interleave.
    pub fn send(&self, event: &Event) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().unwrap();
        framing::write_frame(&mut *writer, event)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
