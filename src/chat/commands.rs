//! Slash command parsing for the tutor REPL.
//!
//! Lines that start with `/` control the session and are never sent to the model.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// List the model catalog, marking the current choice.
    Models,

    /// Select a model from the catalog.
    Model(String),

    /// Show the conversation so far.
    History,

    /// End the current session and start a fresh one.
    New,

    /// Turn context retrieval on or off.
    Rag(bool),

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated as
/// a question for the tutor.
///
/// # Examples
///
/// ```
/// # use codetutor::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model llama3-8b-8192").is_some());
/// assert!(parse_command("Comment écrire une boucle for ?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "models" => ChatCommand::Models,
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "history" => ChatCommand::History,
        "new" | "clear" => ChatCommand::New,
        "rag" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Rag(value),
            None => ChatCommand::Invalid("/rag expects 'on' or 'off'".to_string()),
        },
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
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
  /models                List the available models
  /model <name>          Switch to another model from the list
  /history               Show the conversation so far
  /new                   Start a new conversation
  /rag on|off            Enable or disable context retrieval
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_model() {
        assert_eq!(
            parse_command("/model llama3-8b-8192"),
            Some(ChatCommand::Model("llama3-8b-8192".to_string()))
        );
        assert_eq!(
            parse_command("/model   mixtral-8x7b-32768  "),
            Some(ChatCommand::Model("mixtral-8x7b-32768".to_string()))
        );
        assert_eq!(
            parse_command("/model"),
            Some(ChatCommand::Invalid(
                "/model requires a model name".to_string()
            ))
        );
    }

    #[test]
    fn parse_session_commands() {
        assert_eq!(parse_command("/models"), Some(ChatCommand::Models));
        assert_eq!(parse_command("/HISTORY"), Some(ChatCommand::History));
        assert_eq!(parse_command("/new"), Some(ChatCommand::New));
        assert_eq!(parse_command("/clear"), Some(ChatCommand::New));
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
    }

    #[test]
    fn parse_rag_toggle() {
        assert_eq!(parse_command("/rag on"), Some(ChatCommand::Rag(true)));
        assert_eq!(parse_command("/rag OFF"), Some(ChatCommand::Rag(false)));
        assert!(matches!(
            parse_command("/rag maybe"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
        assert!(matches!(
            parse_command("/rag"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn unknown_commands_are_invalid() {
        assert_eq!(
            parse_command("/temperature 0.5"),
            Some(ChatCommand::Invalid(
                "Unknown command: /temperature".to_string()
            ))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Comment écrire une boucle for ?"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
        assert_eq!(parse_command("a / b"), None);
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for cmd in ["/models", "/model", "/history", "/new", "/rag", "/stats", "/help", "/quit"] {
            assert!(help.contains(cmd), "missing {cmd}");
        }
    }
}
