//! The channel server (C3): one per configured channel. Owns the listening socket,
//! the membership map, the FIFO waiting queue, and the admin-event dispatch loop.

use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chat_proto::{framing, Event};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::ChannelDescriptor;
use crate::error::BindError;
use crate::handler::Handler;
use crate::protocol;
use crate::registry::ChannelRegistry;

/// Synthetic admin events posted by the server controller onto a channel's queue.
/// `Kick` and `Mute` carry a target user-name; `Empty` and `Shutdown` apply to the
/// whole channel.
pub enum AdminEvent {
    Kick(String),
    Empty,
    Mute(String),
    Shutdown,
}

/// Membership map and waiting queue, guarded together so that every mutation is
/// atomic with respect to the capacity check (§5 of the design: "all mutations of
/// membership must be atomic with respect to capacity checks").
struct ChannelState {
    members: HashMap<String, Arc<Handler>>,
    waiting: VecDeque<Arc<Handler>>,
}

struct ChannelThreads {
    accept: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

/// How long the accept loop blocks on `read_timeout` before polling `running`.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long the dispatcher blocks on the admin queue before polling `running`.
const DISPATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Bound on the pre-framed handshake name read: large enough for any sane username,
/// small enough that a hostile peer can't stall a handshake thread on an unbounded
/// buffer (the reimplementation note in the design's open questions).
const MAX_GREETING_BYTES: usize = 256;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChannelServer {
    pub descriptor: ChannelDescriptor,
    listener: TcpListener,
    state: Mutex<ChannelState>,
    admin_tx: Sender<AdminEvent>,
    running: AtomicBool,
    threads: Mutex<Option<ChannelThreads>>,
}

impl ChannelServer {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Bind the listening socket for `descriptor` and print its creation banner.
    /// Does not spawn any threads yet; call [`ChannelServer::start`] once every
    /// channel in the registry has bound successfully.
    pub fn bind(
        descriptor: ChannelDescriptor,
    ) -> Result<(Arc<ChannelServer>, Receiver<AdminEvent>), BindError> {
        let listener =
            TcpListener::bind(("127.0.0.1", descriptor.port)).map_err(|source| BindError {
                port: descriptor.port,
                source,
            })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| BindError {
                port: descriptor.port,
                source,
            })?;

        let (admin_tx, admin_rx) = crossbeam_channel::unbounded();
        let capacity = descriptor.capacity;
        let server = Arc::new(ChannelServer {
            listener,
            state: Mutex::new(ChannelState {
                members: HashMap::with_capacity(capacity),
                waiting: VecDeque::new(),
            }),
            admin_tx,
            running: AtomicBool::new(true),
            threads: Mutex::new(None),
            descriptor,
        });
        println!(
            "Channel \"{}\" is created on port {}, with a capacity of {}.",
            server.descriptor.name, server.descriptor.port, server.descriptor.capacity
        );
        Ok((server, admin_rx))
    }

    /// Spawn the accept loop and the admin dispatcher loop.
    pub fn start(self: &Arc<Self>, registry: Arc<ChannelRegistry>, admin_rx: Receiver<AdminEvent>) {
        let accept_channel = self.clone();
        let accept_registry = registry;
        let accept = thread::Builder::new()
            .name(format!("chat-accept-{}", self.descriptor.name))
            .spawn(move || accept_channel.run_accept(accept_registry))
            .expect("spawn accept thread");

        let dispatch_channel = self.clone();
        let dispatch = thread::Builder::new()
            .name(format!("chat-dispatch-{}", self.descriptor.name))
            .spawn(move || dispatch_channel.run_dispatch(admin_rx))
            .expect("spawn dispatch thread");

        *self.threads.lock().unwrap() = Some(ChannelThreads { accept, dispatch });
    }

    pub fn post_admin(&self, event: AdminEvent) {
        let _ = self.admin_tx.send(event);
    }

    /// Mark the channel not-running and tell every connected client (member or
    /// waiter) that it is shutting down. Safe to call from the controller thread;
    /// does not join the channel's own threads (that would self-deadlock if called
    /// from the dispatch thread).
    pub fn shutdown_now(&self) {
        self.running.store(false, Ordering::Release);
        let all: Vec<Arc<Handler>> = {
            let state = self.state.lock().unwrap();
            state
                .members
                .values()
                .cloned()
                .chain(state.waiting.iter().cloned())
                .collect()
        };
        for handler in &all {
            let _ = handler.send(&Event::Shutdown);
            handler.stop();
        }
    }

    pub fn join_threads(&self) {
        if let Some(threads) = self.threads.lock().unwrap().take() {
            let _ = threads.accept.join();
            let _ = threads.dispatch.join();
        }
    }

    fn contains_name(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.members.contains_key(name) || state.waiting.iter().any(|h| h.name == name)
    }

    fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.members.len(), state.waiting.len())
    }

    fn members_snapshot(&self) -> Vec<Arc<Handler>> {
        self.state.lock().unwrap().members.values().cloned().collect()
    }

    fn broadcast(&self, event: &Event) {
        for member in self.members_snapshot() {
            let _ = member.send(event);
        }
    }

    /// Promote the head of the waiting queue into membership if a slot is free, and
    /// return it along with the remaining waiters (for re-indexing notifications).
    /// Returns `None` if the queue is empty or the channel is already at capacity —
    /// the latter matters because not every call site freed a slot (a departing
    /// waiter never did).
    fn promote_locked(&self) -> Option<(Arc<Handler>, Vec<Arc<Handler>>)> {
        let mut state = self.state.lock().unwrap();
        if state.members.len() >= self.descriptor.capacity {
            return None;
        }
        let next = state.waiting.pop_front()?;
        state.members.insert(next.name.clone(), next.clone());
        next.joined.store(true, Ordering::Release);
        let remaining: Vec<Arc<Handler>> = state.waiting.iter().cloned().collect();
        Some((next, remaining))
    }

    fn announce_promotion(&self, promoted: Arc<Handler>, remaining_waiting: Vec<Arc<Handler>>) {
        let _ = promoted.send(&Event::Join {
            channel: self.descriptor.name.clone(),
        });
        println!("{}", protocol::joined_stdout(&promoted.name, &self.descriptor.name));
        for (idx, waiter) in remaining_waiting.iter().enumerate() {
            let _ = waiter.send(&protocol::queue_position_notice(idx));
        }
    }

    /// Remove `handler` from whichever of membership/waiting it currently occupies
    /// (if any), announce the departure, and promote from the waiting queue. A
    /// handler that was already removed by an admin action (kick/empty/shutdown) is
    /// simply not found here, making this idempotent.
    fn depart(&self, handler: &Arc<Handler>) {
        let found = {
            let mut state = self.state.lock().unwrap();
            if state
                .members
                .get(&handler.name)
                .is_some_and(|existing| Arc::ptr_eq(existing, handler))
            {
                state.members.remove(&handler.name);
                handler.joined.store(false, Ordering::Release);
                true
            } else if let Some(pos) = state.waiting.iter().position(|h| Arc::ptr_eq(h, handler)) {
                state.waiting.remove(pos);
                true
            } else {
                false
            }
        };
        if !found {
            return;
        }
        println!("{}", protocol::left_stdout(&handler.name));
        self.broadcast(&protocol::left_channel_notice(&handler.name));
        if let Some((promoted, remaining)) = self.promote_locked() {
            self.announce_promotion(promoted, remaining);
        }
    }

    fn run_accept(self: Arc<Self>, registry: Arc<ChannelRegistry>) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let channel = self.clone();
                    let registry = registry.clone();
                    thread::spawn(move || channel.handle_connection(stream, registry));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!(channel = %self.descriptor.name, error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    }

    fn run_dispatch(self: Arc<Self>, admin_rx: Receiver<AdminEvent>) {
        loop {
            match admin_rx.recv_timeout(DISPATCH_POLL_INTERVAL) {
                Ok(AdminEvent::Kick(target)) => self.admin_kick(&target),
                Ok(AdminEvent::Empty) => self.admin_empty(),
                Ok(AdminEvent::Mute(target)) => self.admin_mute(&target),
                Ok(AdminEvent::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn admin_kick(&self, target: &str) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            if let Some(h) = state.members.remove(target) {
                h.joined.store(false, Ordering::Release);
                Some(h)
            } else if let Some(pos) = state.waiting.iter().position(|h| h.name == target) {
                state.waiting.remove(pos)
            } else {
                None
            }
        };
        match removed {
            Some(handler) => {
                let _ = handler.send(&protocol::kick(target));
                handler.stop();
                println!("{}", protocol::kicked_stdout(target));
                self.broadcast(&protocol::left_channel_notice(target));
                if let Some((promoted, remaining)) = self.promote_locked() {
                    self.announce_promotion(promoted, remaining);
                }
            }
            None => println!("{}", protocol::not_found_stdout(target)),
        }
    }

    fn admin_empty(&self) {
        let removed: Vec<Arc<Handler>> = {
            let mut state = self.state.lock().unwrap();
            let removed: Vec<Arc<Handler>> = state.members.drain().map(|(_, h)| h).collect();
            for h in &removed {
                h.joined.store(false, Ordering::Release);
            }
            removed
        };
        for handler in &removed {
            let _ = handler.send(&protocol::kick(&handler.name));
            handler.stop();
        }
        println!("{}", protocol::emptied_stdout(&self.descriptor.name));
        while let Some((promoted, remaining)) = self.promote_locked() {
            self.announce_promotion(promoted, remaining);
        }
    }

    fn admin_mute(&self, target: &str) {
        let state = self.state.lock().unwrap();
        if let Some(handler) = state.members.get(target) {
            let muted = !handler.muted.load(Ordering::Acquire);
            handler.muted.store(muted, Ordering::Release);
        }
    }

    fn handle_connection(self: Arc<Self>, mut stream: TcpStream, registry: Arc<ChannelRegistry>) {
        if stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).is_err() {
            return;
        }
        let mut buf = [0u8; MAX_GREETING_BYTES];
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let name = match std::str::from_utf8(&buf[..n]) {
            Ok(s) => s.to_string(),
            Err(_) => return,
        };

        enum Admission {
            Joined,
            Queued { ahead: usize },
        }

        let outcome = {
            let mut state = self.state.lock().unwrap();
            if state.members.contains_key(&name) || state.waiting.iter().any(|h| h.name == name) {
                None
            } else {
                let writer = match stream.try_clone() {
                    Ok(w) => w,
                    Err(_) => return,
                };
                let handler = Arc::new(Handler::new(name.clone(), writer));
                let admission = if state.members.len() < self.descriptor.capacity {
                    state.members.insert(name.clone(), handler.clone());
                    handler.joined.store(true, Ordering::Release);
                    Admission::Joined
                } else {
                    state.waiting.push_back(handler.clone());
                    Admission::Queued {
                        ahead: state.waiting.len() - 1,
                    }
                };
                Some((handler, admission))
            }
        };

        let (handler, admission) = match outcome {
            Some(pair) => pair,
            None => {
                let _ = framing::write_raw(&mut stream, self.descriptor.name.as_bytes());
                return;
            }
        };
        if framing::write_raw(&mut stream, protocol::GREETING_ADMIT).is_err() {
            return;
        }

        match admission {
            Admission::Joined => {
                let _ = handler.send(&Event::Join {
                    channel: self.descriptor.name.clone(),
                });
                println!("{}", protocol::joined_stdout(&handler.name, &self.descriptor.name));
            }
            Admission::Queued { ahead } => {
                let _ = handler.send(&protocol::queue_position_notice(ahead));
            }
        }

        stream.set_read_timeout(None).ok();
        self.read_loop(handler, stream, registry);
    }

    fn read_loop(self: &Arc<Self>, handler: Arc<Handler>, mut stream: TcpStream, registry: Arc<ChannelRegistry>) {
        loop {
            match framing::read_frame(&mut stream) {
                Ok(Some(event)) => {
                    if self.dispatch_client_event(&handler, event, &registry) {
                        break;
                    }
                }
                Ok(None) => {
                    self.depart(&handler);
                    break;
                }
                Err(err) => {
                    tracing::warn!(handler = %handler.name, error = %err, "protocol error, closing connection");
                    self.depart(&handler);
                    break;
                }
            }
        }
        handler.stop();
        let _ = stream.shutdown(Shutdown::Both);
    }

    /// Returns `true` if the reader loop should stop (the handler left this channel).
    fn dispatch_client_event(
        &self,
        handler: &Arc<Handler>,
        event: Event,
        registry: &Arc<ChannelRegistry>,
    ) -> bool {
        match event {
            Event::Message { name, message } => {
                self.handle_message(handler, &name, message);
                false
            }
            Event::Quit { .. } => {
                self.handle_quit(handler);
                true
            }
            Event::Whisper {
                sender,
                target,
                message,
            } => {
                self.handle_whisper(handler, &sender, &target, message);
                false
            }
            Event::List { .. } => {
                self.handle_list(handler, registry);
                false
            }
            Event::Switch { name, channel } => self.handle_switch(handler, &name, &channel, registry),
            Event::Join { .. }
            | Event::Shutdown
            | Event::Kick { .. }
            | Event::Mute { .. }
            | Event::Empty
            | Event::Send => false,
        }
    }

    fn handle_message(&self, handler: &Arc<Handler>, name: &str, message: String) {
        if !handler.joined.load(Ordering::Acquire) || handler.muted.load(Ordering::Acquire) {
            return;
        }
        if name != handler.name {
            tracing::warn!(handler = %handler.name, claimed = %name, "MESSAGE name mismatch, dropping");
            return;
        }
        println!("{}", protocol::message_stdout(&handler.name, &message));
        self.broadcast(&Event::Message {
            name: handler.name.clone(),
            message,
        });
    }

    fn handle_quit(&self, handler: &Arc<Handler>) {
        let _ = handler.send(&Event::Quit {
            name: handler.name.clone(),
        });
        self.depart(handler);
    }

    fn handle_whisper(&self, handler: &Arc<Handler>, sender: &str, target: &str, message: String) {
        let target_handler = {
            let state = self.state.lock().unwrap();
            state.members.get(target).cloned()
        };
        match target_handler {
            Some(target_handler) => {
                let _ = target_handler.send(&protocol::whisper_to_target(sender, message.clone()));
                let _ = handler.send(&protocol::whisper_confirmation(sender, target, message.clone()));
                println!("{}", protocol::whisper_stdout(sender, target, &message));
            }
            None => {
                let _ = handler.send(&protocol::not_in_channel_notice(target));
            }
        }
    }

    fn handle_list(&self, handler: &Arc<Handler>, registry: &Arc<ChannelRegistry>) {
        for channel in registry.iter() {
            let (used, queued) = channel.counts();
            let _ = handler.send(&protocol::channel_roster_line(
                &channel.descriptor.name,
                channel.descriptor.port,
                used,
                channel.descriptor.capacity,
                queued,
            ));
        }
    }

    /// Returns `true` if the handler should stop reading on this channel (it left,
    /// successfully or not — a rejected switch keeps it here, so this only returns
    /// `true` on success).
    fn handle_switch(
        &self,
        handler: &Arc<Handler>,
        name: &str,
        dest_name: &str,
        registry: &Arc<ChannelRegistry>,
    ) -> bool {
        let Some(dest) = registry.find(dest_name) else {
            let _ = handler.send(&protocol::channel_missing_notice(dest_name));
            return false;
        };
        if dest.contains_name(name) {
            let _ = handler.send(&protocol::channel_name_taken_notice(dest_name, name));
            return false;
        }
        self.depart(handler);
        let _ = handler.send(&Event::Switch {
            name: name.to_string(),
            channel: dest.descriptor.port.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    /// Bind an ephemeral listener just to learn a free port, then drop it. Small
    /// TOCTOU window, the same tradeoff every "find a free port for a socket test"
    /// helper makes.
    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn spawn_channel(name: &str, capacity: usize) -> (Arc<ChannelServer>, Arc<ChannelRegistry>, u16) {
        let port = free_port();
        let descriptor = ChannelDescriptor {
            name: name.to_string(),
            port,
            capacity,
        };
        let (channel, admin_rx) = ChannelServer::bind(descriptor).expect("bind");
        let registry = Arc::new(ChannelRegistry::new(vec![channel.clone()]));
        channel.start(registry.clone(), admin_rx);
        (channel, registry, port)
    }

    /// Connect, send the raw handshake name, and return the stream positioned right
    /// after the admit byte (or panic on a rejection, since these tests only expect
    /// admission at the handshake level - being queued still gets "Y").
    fn handshake(port: u16, name: &str) -> TcpStream {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(name.as_bytes()).unwrap();
        let mut reply = [0u8; 1];
        stream.read_exact(&mut reply).expect("handshake reply");
        assert_eq!(&reply, b"Y", "expected admission for {name}");
        stream
    }

    fn handshake_rejected(port: u16, name: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(name.as_bytes()).unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        String::from_utf8(buf).unwrap()
    }

    fn recv(stream: &mut TcpStream) -> Event {
        framing::read_frame(stream)
            .expect("read_frame")
            .expect("peer still connected")
    }

    fn send(stream: &mut TcpStream, event: &Event) {
        framing::write_frame(stream, event).expect("write_frame");
    }

    #[test]
    fn capacity_and_waiting_queue_promotion() {
        let (channel, _registry, port) = spawn_channel("core", 2);

        let mut a = handshake(port, "a");
        assert_eq!(recv(&mut a), Event::Join { channel: "core".into() });
        let mut b = handshake(port, "b");
        assert_eq!(recv(&mut b), Event::Join { channel: "core".into() });

        let mut c = handshake(port, "c");
        assert_eq!(
            recv(&mut c),
            protocol::queue_position_notice(0),
            "first waiter is told nobody is ahead"
        );
        let mut d = handshake(port, "d");
        assert_eq!(
            recv(&mut d),
            protocol::queue_position_notice(1),
            "second waiter is told one is ahead"
        );

        send(&mut a, &Event::Quit { name: "a".into() });
        assert_eq!(recv(&mut a), Event::Quit { name: "a".into() });

        // c is promoted off the head of the queue; d is re-indexed to "0 ahead".
        assert_eq!(recv(&mut c), Event::Join { channel: "core".into() });
        assert_eq!(recv(&mut d), protocol::queue_position_notice(0));

        let (members, waiting) = channel.counts();
        assert_eq!(members, 2, "b and c now hold the two membership slots");
        assert_eq!(waiting, 1, "d is still waiting");
    }

    #[test]
    fn broadcast_reaches_every_member_but_not_itself_twice() {
        let (_channel, _registry, port) = spawn_channel("core", 3);
        let mut a = handshake(port, "a");
        assert_eq!(recv(&mut a), Event::Join { channel: "core".into() });
        let mut b = handshake(port, "b");
        assert_eq!(recv(&mut b), Event::Join { channel: "core".into() });

        send(
            &mut a,
            &Event::Message {
                name: "a".into(),
                message: "hello".into(),
            },
        );
        let expected = Event::Message {
            name: "a".into(),
            message: "hello".into(),
        };
        assert_eq!(recv(&mut a), expected);
        assert_eq!(recv(&mut b), expected);
    }

    #[test]
    fn whisper_is_private() {
        let (_channel, _registry, port) = spawn_channel("core", 3);
        let mut a = handshake(port, "a");
        assert_eq!(recv(&mut a), Event::Join { channel: "core".into() });
        let mut b = handshake(port, "b");
        assert_eq!(recv(&mut b), Event::Join { channel: "core".into() });
        let mut c = handshake(port, "c");
        assert_eq!(recv(&mut c), Event::Join { channel: "core".into() });

        send(
            &mut a,
            &Event::Whisper {
                sender: "a".into(),
                target: "b".into(),
                message: "hi".into(),
            },
        );

        assert_eq!(
            recv(&mut b),
            Event::Message {
                name: "a whispers to you".into(),
                message: "hi".into(),
            }
        );
        assert_eq!(
            recv(&mut a),
            Event::Message {
                name: "a whispers to b".into(),
                message: "hi".into(),
            }
        );

        c.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        let mut len_buf = [0u8; 4];
        let err = c.read_exact(&mut len_buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn name_collision_is_rejected_with_the_channel_name() {
        let (_channel, _registry, port) = spawn_channel("core", 2);
        let mut a = handshake(port, "a");
        assert_eq!(recv(&mut a), Event::Join { channel: "core".into() });

        let reply = handshake_rejected(port, "a");
        assert_eq!(reply, "core");
    }

    #[test]
    fn admin_kick_removes_member_and_notifies_remaining() {
        let (channel, _registry, port) = spawn_channel("core", 2);
        let mut a = handshake(port, "a");
        assert_eq!(recv(&mut a), Event::Join { channel: "core".into() });
        let mut b = handshake(port, "b");
        assert_eq!(recv(&mut b), Event::Join { channel: "core".into() });

        channel.post_admin(AdminEvent::Kick("a".into()));

        assert_eq!(recv(&mut a), Event::Kick { target: "a".into() });
        assert_eq!(recv(&mut b), protocol::left_channel_notice("a"));
    }
}
