//! Entry point for the `chatclient` binary.
//!
//! `chatclient port_number client_username`: connects to one channel port, performs
//! the name handshake, then runs a reader thread against the socket while the main
//! thread turns stdin lines into protocol events. A `/switch` reply is handled
//! entirely inside the reader thread, which reconnects and hands the command loop a
//! fresh writer via [`connection::Connection::replace`] — the main thread never
//! notices which socket it's writing to.

mod commands;
mod connection;

use std::io::{self, BufRead};
use std::net::TcpStream;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use chat_proto::Event;
use commands::Command;
use connection::{connect_and_handshake, Connection, Handshake};

struct Args {
    port: u16,
    username: String,
}

/// Outcome of parsing the CLI arguments. A bad or out-of-range port is reported
/// distinctly from a usage error: it maps to exit 7 (`Error: Unable to connect to
/// port {p}.`), not exit 3, mirroring the original's `check_args()` ordering (arg
/// count/spaced username first, then the port, then the empty-username check).
enum ArgsOutcome {
    Parsed(Args),
    Usage,
    BadPort(String),
}

fn parse_args() -> ArgsOutcome {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 || args[1].contains(' ') {
        return ArgsOutcome::Usage;
    }
    let port_str = &args[0];
    let port: u16 = match port_str.parse() {
        Ok(port) if (1024..=65535).contains(&port) => port,
        _ => return ArgsOutcome::BadPort(port_str.clone()),
    };
    let username = args[1].clone();
    if username.is_empty() {
        return ArgsOutcome::Usage;
    }
    ArgsOutcome::Parsed(Args { port, username })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = match parse_args() {
        ArgsOutcome::Parsed(args) => args,
        ArgsOutcome::Usage => {
            eprintln!("Usage: chatclient port_number client_username");
            return ExitCode::from(3);
        }
        ArgsOutcome::BadPort(port_str) => {
            eprintln!("Error: Unable to connect to port {port_str}.");
            return ExitCode::from(7);
        }
    };

    let stream = match connect_and_handshake(args.port, &args.username) {
        Ok(Handshake::Admitted(stream)) => stream,
        Ok(Handshake::Rejected(channel)) => {
            println!(
                "[Server Message] Channel \"{channel}\" already has user {}.",
                args.username
            );
            return ExitCode::from(2);
        }
        Err(_) => {
            eprintln!("Error: Unable to connect to port {}.", args.port);
            return ExitCode::from(7);
        }
    };
    println!("Welcome to chatclient, {}.", args.username);

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => {
            eprintln!("Error: Unable to connect to port {}.", args.port);
            return ExitCode::from(7);
        }
    };
    let connection = Arc::new(Connection::new(stream));

    let reader_name = args.username.clone();
    let reader_connection = connection.clone();
    thread::spawn(move || read_loop(reader_name, reader_connection, reader_stream));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let stripped = line.trim_end_matches(['\n', '\r']);
        dispatch_command(&connection, &args.username, stripped);
    }
    // End of input behaves like an explicit /quit: tell the server and let the
    // reader thread's Quit echo drive the actual exit.
    let _ = connection.send(&Event::Quit {
        name: args.username.clone(),
    });

    // The reader thread owns every terminal exit path (Quit echo, Kick, Shutdown, a
    // closed socket); park forever so this thread doesn't race it to process exit.
    loop {
        thread::park();
    }
}

fn dispatch_command(connection: &Connection, name: &str, line: &str) {
    let Some(command) = commands::parse(line) else {
        return;
    };
    let event = match command {
        Command::Say(message) => Event::Message {
            name: name.to_string(),
            message,
        },
        Command::Quit => Event::Quit {
            name: name.to_string(),
        },
        Command::List => Event::List {
            requester: name.to_string(),
        },
        Command::Whisper { target, message } => Event::Whisper {
            sender: name.to_string(),
            target,
            message,
        },
        Command::Switch { channel } => Event::Switch {
            name: name.to_string(),
            channel,
        },
        Command::Send { target, .. } => {
            println!("[Server Message] /send is not supported by this server.");
            let _ = target;
            return;
        }
        Command::Usage(message) => {
            println!("[Server Message] {message}");
            return;
        }
    };
    let _ = connection.send(&event);
}

/// Runs until the connection ends the process; never returns normally.
fn read_loop(name: String, connection: Arc<Connection>, mut reader: TcpStream) -> ! {
    loop {
        match chat_proto::framing::read_frame(&mut reader) {
            Ok(Some(event)) => match event {
                Event::Message { name, message } => println!("[{name}] {message}"),
                Event::Join { channel } => {
                    println!("[Server Message] You have joined the channel \"{channel}\".")
                }
                Event::Quit { .. } => std::process::exit(0),
                Event::Kick { .. } => {
                    println!("[Server Message] You are removed from the channel.");
                    std::process::exit(0);
                }
                Event::Shutdown => {
                    eprintln!("Error: server connection closed.");
                    std::process::exit(8);
                }
                Event::Switch { name: who, channel } => {
                    let Ok(port) = channel.parse::<u16>() else {
                        eprintln!("Error: Unable to connect to port {channel}.");
                        std::process::exit(7);
                    };
                    match connect_and_handshake(port, &who) {
                        Ok(Handshake::Admitted(new_stream)) => {
                            let clone = match new_stream.try_clone() {
                                Ok(c) => c,
                                Err(_) => {
                                    eprintln!("Error: Unable to connect to port {port}.");
                                    std::process::exit(7);
                                }
                            };
                            connection.replace(new_stream);
                            reader = clone;
                            println!("Welcome to chatclient, {who}.");
                        }
                        Ok(Handshake::Rejected(rejecting_channel)) => {
                            println!(
                                "[Server Message] Channel \"{rejecting_channel}\" already has user {who}."
                            );
                            std::process::exit(2);
                        }
                        Err(_) => {
                            eprintln!("Error: Unable to connect to port {port}.");
                            std::process::exit(7);
                        }
                    }
                }
                Event::List { .. } | Event::Mute { .. } | Event::Empty | Event::Send => {}
            },
            Ok(None) => {
                eprintln!("Error: server connection closed.");
                std::process::exit(8);
            }
            Err(err) => {
                tracing::warn!(%name, error = %err, "protocol error on read, closing");
                eprintln!("Error: server connection closed.");
                std::process::exit(8);
            }
        }
    }
}
