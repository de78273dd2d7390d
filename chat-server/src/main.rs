//! Entry point for the `chatserver` binary.
//!
//! `chatserver [afk_time] config_file`: loads the channel descriptors, binds every
//! listener up front (so a single bad port fails the whole server before any client
//! can connect to a partially-started one), spawns each channel's threads, then hands
//! the process over to the operator's admin console on stdin.

mod channel;
mod config;
mod controller;
mod error;
mod handler;
mod protocol;
mod registry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use channel::ChannelServer;
use controller::ServerController;
use registry::ChannelRegistry;

/// Reserved for future idle-disconnect behaviour; accepted and validated but not
/// currently acted upon (see the design's open questions on `afk_time`).
#[allow(dead_code)]
struct Args {
    afk_time: Option<u32>,
    config_file: PathBuf,
}

fn parse_args() -> Option<Args> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    match args.len() {
        1 => Some(Args {
            afk_time: None,
            config_file: PathBuf::from(args.remove(0)),
        }),
        2 => {
            let afk_time: u32 = args[0].parse().ok()?;
            if !(1..=1000).contains(&afk_time) {
                return None;
            }
            Some(Args {
                afk_time: Some(afk_time),
                config_file: PathBuf::from(args.remove(1)),
            })
        }
        _ => None,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Some(args) = parse_args() else {
        eprintln!("Usage: chatserver [afk_time] config_file");
        return ExitCode::from(4);
    };

    let descriptors = match config::load(&args.config_file) {
        Ok(descriptors) => descriptors,
        Err(error::ConfigError::Missing) => {
            eprintln!("Usage: chatserver [afk_time] config_file");
            return ExitCode::from(4);
        }
        Err(error::ConfigError::Invalid) => {
            eprintln!("Error: Invalid configuration file.");
            return ExitCode::from(5);
        }
    };

    let mut channels = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let port = descriptor.port;
        let (channel, admin_rx) = match ChannelServer::bind(descriptor) {
            Ok(pair) => pair,
            Err(_) => {
                eprintln!("Error: unable to listen on port {port}.");
                return ExitCode::from(6);
            }
        };
        channels.push((channel, admin_rx));
    }

    let registry = Arc::new(ChannelRegistry::new(
        channels.iter().map(|(c, _)| c.clone()).collect(),
    ));
    for (channel, admin_rx) in channels {
        channel.start(registry.clone(), admin_rx);
    }

    let controller = Arc::new(ServerController::new(registry));
    let ctrlc_controller = controller.clone();
    let _ = ctrlc::set_handler(move || {
        ctrlc_controller.shutdown();
        println!("[Server Message] Server shuts down.");
        std::process::exit(0);
    });

    controller.run();
    ExitCode::SUCCESS
}
