//! Greeting handshake bytes and the literal notification templates used throughout
//! the server. Centralising the text here keeps §6/§7's "tests depend on these
//! verbatim" templates in one place instead of scattered across the dispatch code.

use chat_proto::Event;

/// Raw handshake reply admitting the connection (unframed, pre-protocol).
pub const GREETING_ADMIT: &[u8] = b"Y";

/// The `name` field used for server-synthesised notices that aren't a whisper or a
/// channel roster line.
pub const SERVER_MESSAGE: &str = "Server Message";

/// Build a system notice as a MESSAGE event with the conventional `Server Message`
/// label.
pub fn notice(message: impl Into<String>) -> Event {
    Event::Message {
        name: SERVER_MESSAGE.to_string(),
        message: message.into(),
    }
}

pub fn queue_position_notice(ahead: usize) -> Event {
    notice(format!(
        "You are in the waiting queue and there are {ahead} user(s) ahead of you."
    ))
}

pub fn left_channel_notice(name: &str) -> Event {
    notice(format!("{name} has left the channel."))
}

pub fn not_in_channel_notice(target: &str) -> Event {
    notice(format!("{target} is not in the channel."))
}

pub fn channel_missing_notice(channel: &str) -> Event {
    notice(format!("Channel \"{channel}\" does not exist."))
}

pub fn channel_name_taken_notice(channel: &str, name: &str) -> Event {
    notice(format!("Channel \"{channel}\" already has user {name}."))
}

/// The frame a kicked or emptied client receives. The client prints its own
/// "You are removed from the channel." locally on receipt rather than echoing
/// server-chosen text, so the body only needs to name the target.
pub fn kick(target: &str) -> Event {
    Event::Kick {
        target: target.to_string(),
    }
}

pub fn whisper_to_target(sender: &str, message: String) -> Event {
    Event::Message {
        name: format!("{sender} whispers to you"),
        message,
    }
}

pub fn whisper_confirmation(sender: &str, target: &str, message: String) -> Event {
    Event::Message {
        name: format!("{sender} whispers to {target}"),
        message,
    }
}

pub fn channel_roster_line(name: &str, port: u16, used: usize, capacity: usize, queued: usize) -> Event {
    Event::Message {
        name: "Channel".to_string(),
        message: format!("{name} {port} Capacity: {used}/{capacity}, Queue: {queued}"),
    }
}

pub fn joined_stdout(name: &str, channel: &str) -> String {
    format!("[Server Message] {name} has joined the channel \"{channel}\".")
}

pub fn left_stdout(name: &str) -> String {
    format!("[Server Message] {name} has left the channel.")
}

pub fn kicked_stdout(target: &str) -> String {
    format!("[Server Message] Kicked {target}.")
}

pub fn not_found_stdout(target: &str) -> String {
    format!("[Server Message] {target} is not in the channel.")
}

pub fn emptied_stdout(channel: &str) -> String {
    format!("[Server Message] \"{channel}\" has been emptied.")
}

pub fn whisper_stdout(sender: &str, target: &str, message: &str) -> String {
    format!("[{sender} whispers to {target}] {message}")
}

pub fn message_stdout(name: &str, message: &str) -> String {
    format!("[{name}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_match_the_spec_verbatim() {
        assert_eq!(
            joined_stdout("a", "core"),
            "[Server Message] a has joined the channel \"core\"."
        );
        assert_eq!(left_stdout("a"), "[Server Message] a has left the channel.");
        assert_eq!(kicked_stdout("a"), "[Server Message] Kicked a.");
        assert_eq!(not_found_stdout("z"), "[Server Message] z is not in the channel.");
        assert_eq!(emptied_stdout("core"), "[Server Message] \"core\" has been emptied.");
        assert_eq!(whisper_stdout("a", "b", "hi"), "[a whispers to b] hi");
        assert_eq!(message_stdout("a", "hello"), "[a] hello");
    }

    #[test]
    fn queue_position_notice_uses_zero_based_count_ahead() {
        assert_eq!(
            queue_position_notice(0),
            notice("You are in the waiting queue and there are 0 user(s) ahead of you.")
        );
        assert_eq!(
            queue_position_notice(3),
            notice("You are in the waiting queue and there are 3 user(s) ahead of you.")
        );
    }

    #[test]
    fn whisper_events_carry_the_message_in_a_relabelled_message_event() {
        assert_eq!(
            whisper_to_target("a", "hi".to_string()),
            Event::Message {
                name: "a whispers to you".to_string(),
                message: "hi".to_string(),
            }
        );
        assert_eq!(
            whisper_confirmation("a", "b", "hi".to_string()),
            Event::Message {
                name: "a whispers to b".to_string(),
                message: "hi".to_string(),
            }
        );
    }

    #[test]
    fn channel_roster_line_matches_the_spec_format() {
        assert_eq!(
            channel_roster_line("core", 9001, 2, 3, 1),
            Event::Message {
                name: "Channel".to_string(),
                message: "core 9001 Capacity: 2/3, Queue: 1".to_string(),
            }
        );
    }
}
