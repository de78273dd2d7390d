//! Translation of one line of terminal input into a protocol action.
//!
//! This is the out-of-scope "terminal input loop and command syntax" boundary named
//! in the design: the wire contract is what's tested, this module is just the
//! textual front door onto it.

/// One parsed line of user input.
pub enum Command {
    /// Plain text with no leading `/`: a broadcast MESSAGE.
    Say(String),
    Quit,
    List,
    Whisper { target: String, message: String },
    Switch { channel: String },
    /// Reserved; file transfer is unspecified in this revision.
    Send { target: String, file: String },
    /// Malformed command; the usage string to print locally.
    Usage(&'static str),
}

pub fn parse(line: &str) -> Option<Command> {
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Say(line.to_string()));
    }
    let well_formed = line == line.trim();
    let parts: Vec<&str> = line.split_whitespace().collect();
    let command = parts[0];
    Some(match command {
        "/quit" => {
            if well_formed && parts.len() == 1 {
                Command::Quit
            } else {
                Command::Usage("Usage: /quit")
            }
        }
        "/list" => {
            if well_formed && parts.len() == 1 {
                Command::List
            } else {
                Command::Usage("Usage: /list")
            }
        }
        "/whisper" => {
            if well_formed && parts.len() >= 3 {
                let target = parts[1].to_string();
                // `parts` already collapsed whitespace runs (`split_whitespace`); rebuild
                // the message from its tokens instead of re-slicing `line`, which would
                // let runs of spaces between words leak a stray leading space into it.
                let message = parts[2..].join(" ");
                Command::Whisper { target, message }
            } else {
                Command::Usage("Usage: /whisper receiver_client_username chat_message")
            }
        }
        "/switch" => {
            if well_formed && parts.len() == 2 {
                Command::Switch {
                    channel: parts[1].to_string(),
                }
            } else {
                Command::Usage("Usage: /switch channel_name")
            }
        }
        "/send" => {
            if well_formed && parts.len() == 3 {
                Command::Send {
                    target: parts[1].to_string(),
                    file: parts[2].to_string(),
                }
            } else {
                Command::Usage("Usage: /send target_client_username file_path")
            }
        }
        // Anything else starting with `/` is just sent as a literal chat line, the
        // same as the reference client's fallback case.
        _ => Command::Say(line.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_say() {
        assert!(matches!(parse("hello there").unwrap(), Command::Say(s) if s == "hello there"));
    }

    #[test]
    fn quit_with_trailing_garbage_is_usage() {
        assert!(matches!(parse("/quit now").unwrap(), Command::Usage(_)));
        assert!(matches!(parse("/quit").unwrap(), Command::Quit));
    }

    #[test]
    fn whisper_keeps_the_rest_of_the_line_as_one_message() {
        match parse("/whisper bob hello there friend").unwrap() {
            Command::Whisper { target, message } => {
                assert_eq!(target, "bob");
                assert_eq!(message, "hello there friend");
            }
            _ => panic!("expected Whisper"),
        }
    }

    #[test]
    fn whisper_collapses_runs_of_whitespace_in_the_message() {
        match parse("/whisper bob  hi  there").unwrap() {
            Command::Whisper { target, message } => {
                assert_eq!(target, "bob");
                assert_eq!(message, "hi there");
            }
            _ => panic!("expected Whisper"),
        }
    }

    #[test]
    fn whisper_without_a_message_is_usage() {
        assert!(matches!(parse("/whisper bob").unwrap(), Command::Usage(_)));
    }

    #[test]
    fn switch_needs_exactly_one_argument() {
        match parse("/switch future").unwrap() {
            Command::Switch { channel } => assert_eq!(channel, "future"),
            _ => panic!("expected Switch"),
        }
        assert!(matches!(parse("/switch").unwrap(), Command::Usage(_)));
        assert!(matches!(parse("/switch a b").unwrap(), Command::Usage(_)));
    }

    #[test]
    fn trailing_whitespace_forces_usage() {
        assert!(matches!(parse("/quit ").unwrap(), Command::Usage(_)));
    }

    #[test]
    fn leading_whitespace_means_no_leading_slash_so_its_a_say() {
        // Mirrors the original client: `startswith("/")` is false for " /quit", so it
        // never reaches the command switch at all.
        assert!(matches!(parse(" /quit").unwrap(), Command::Say(s) if s == " /quit"));
    }

    #[test]
    fn unknown_slash_command_falls_back_to_say() {
        assert!(matches!(parse("/frobnicate").unwrap(), Command::Say(_)));
    }
}
