//! Fatal, process-exiting error kinds for the server binary.
//!
//! Connection-scoped failures (a malformed frame, a peer disconnecting) never reach
//! this module: they are handled where they occur and terminate only that handler.
//! These variants exist to carry the exit codes from [`crate::main`] out to `main()`.

use std::io;

use thiserror::Error;

/// The configuration file was missing, malformed, or produced zero channels.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing config file")]
    Missing,
    #[error("invalid configuration file")]
    Invalid,
}

/// A channel's listening socket could not be bound.
#[derive(Error, Debug)]
#[error("unable to listen on port {port}")]
pub struct BindError {
    pub port: u16,
    #[source]
    pub source: io::Error,
}
