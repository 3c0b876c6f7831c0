//! Slash command parsing for the chat front end.
//!
//! Input starting with `/` controls the session instead of being sent to
//! the backend.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Close the session and open a fresh one.
    Clear,

    /// Show which transport carries messages.
    Mode,

    /// Show the exchanges sent along with fallback requests.
    History,

    /// Write the transcript as JSON, to a file or to stdout.
    Dump(Option<String>),

    /// Probe the backend health endpoint.
    Health,

    /// Switch between markdown and escaped-text rendering.
    Markdown(bool),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use chatlink::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/dump transcript.json").is_some());
/// assert!(parse_command("What projects has he built?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" | "reset" => ChatCommand::Clear,
        "mode" => ChatCommand::Mode,
        "history" => ChatCommand::History,
        "dump" => ChatCommand::Dump(argument.map(|s| s.to_string())),
        "health" => ChatCommand::Health,
        "markdown" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Markdown(value),
            None => ChatCommand::Invalid("/markdown expects 'on' or 'off'".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Start a new session (clears the transcript)
  /mode                  Show the active transport (live or fallback)
  /history               Show the exchanges sent with fallback requests
  /dump [file]           Write the transcript as JSON
  /health                Probe the backend health endpoint
  /markdown on|off       Render replies as markdown or escaped text
  /help                  Show this help message
  /quit                  Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_are_not_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("  tell me about /etc  "), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/reset"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/mode"), Some(ChatCommand::Mode));
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/health"), Some(ChatCommand::Health));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
        assert_eq!(parse_command("  /QUIT  "), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
    }

    #[test]
    fn dump_takes_optional_path() {
        assert_eq!(parse_command("/dump"), Some(ChatCommand::Dump(None)));
        assert_eq!(
            parse_command("/dump  out.json "),
            Some(ChatCommand::Dump(Some("out.json".to_string())))
        );
    }

    #[test]
    fn markdown_toggle() {
        assert_eq!(
            parse_command("/markdown off"),
            Some(ChatCommand::Markdown(false))
        );
        assert_eq!(
            parse_command("/markdown ON"),
            Some(ChatCommand::Markdown(true))
        );
        assert!(matches!(
            parse_command("/markdown"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model gpt"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }
}
