//! The server controller (C4): owns every channel, reads admin commands from the
//! operator's stdin, and drives orderly shutdown.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::channel::AdminEvent;
use crate::registry::ChannelRegistry;

pub struct ServerController {
    registry: Arc<ChannelRegistry>,
    shutting_down: AtomicBool,
}

impl ServerController {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        ServerController {
            registry,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Block reading admin commands from stdin until `/shutdown`, an equivalent
    /// malformed-free exit command, or end-of-input.
    pub fn run(&self) {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(_)) | None => "/shutdown".to_string(),
            };
            let stripped = line.trim();
            let well_formed = line == stripped;
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            let Some(&command) = parts.first() else {
                continue;
            };
            match command {
                "/shutdown" => {
                    if !well_formed || parts.len() != 1 {
                        println!("Usage: /shutdown");
                    } else {
                        self.shutdown();
                        println!("[Server Message] Server shuts down.");
                        break;
                    }
                }
                "/kick" => {
                    if !well_formed || parts.len() != 3 {
                        println!("Usage: /kick channel_name client_username");
                    } else {
                        self.route(parts[1], AdminEvent::Kick(parts[2].to_string()));
                    }
                }
                "/empty" => {
                    if !well_formed || parts.len() != 2 {
                        println!("Usage: /empty channel_name");
                    } else {
                        self.route(parts[1], AdminEvent::Empty);
                    }
                }
                "/mute" => {
                    if !well_formed || !(parts.len() == 3 || parts.len() == 4) {
                        println!("Usage: /mute channel_name client_username [seconds]");
                    } else {
                        self.route(parts[1], AdminEvent::Mute(parts[2].to_string()));
                    }
                }
                _ => {}
            }
        }
    }

    fn route(&self, channel_name: &str, event: AdminEvent) {
        match self.registry.find(channel_name) {
            Some(channel) => channel.post_admin(event),
            None => println!("[Server Message] Channel \"{channel_name}\" does not exist."),
        }
    }

    /// Broadcast SHUTDOWN to every channel, mark each not-running, and join every
    /// channel's threads. Idempotent: a concurrent Ctrl+C handler and the normal
    /// `/shutdown` command path can both call this safely.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for channel in self.registry.iter() {
            channel.shutdown_now();
            channel.post_admin(AdminEvent::Shutdown);
        }
        for channel in self.registry.iter() {
            channel.join_threads();
        }
    }
}
