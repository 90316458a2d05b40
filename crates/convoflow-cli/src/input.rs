// Interactive input parsing for `convoflow listen`

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// Plain text sent as a user message
    Send(String),
    Confirm(String),
    Cancel(String),
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_input_line(line: &str) -> InputCommand {
    let line = line.trim();
    if line.is_empty() {
        return InputCommand::Empty;
    }
    if !line.starts_with('/') {
        return InputCommand::Send(line.to_string());
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim).filter(|a| !a.is_empty());

    match (command, argument) {
        ("/confirm", Some(id)) => InputCommand::Confirm(id.to_string()),
        ("/cancel", Some(id)) => InputCommand::Cancel(id.to_string()),
        ("/confirm" | "/cancel", None) => {
            InputCommand::Invalid(format!("usage: {} <tool_call_id>", command))
        }
        ("/quit" | "/exit", _) => InputCommand::Quit,
        _ => InputCommand::Invalid(format!("unknown command: {}", command)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(
            parse_input_line("  summarize the report "),
            InputCommand::Send("summarize the report".to_string())
        );
        assert_eq!(parse_input_line("   "), InputCommand::Empty);
    }

    #[test]
    fn test_tool_commands() {
        assert_eq!(
            parse_input_line("/confirm call_1"),
            InputCommand::Confirm("call_1".to_string())
        );
        assert_eq!(
            parse_input_line("/cancel   call_2 "),
            InputCommand::Cancel("call_2".to_string())
        );
        assert_eq!(
            parse_input_line("/cancel"),
            InputCommand::Invalid("usage: /cancel <tool_call_id>".to_string())
        );
    }

    #[test]
    fn test_other_commands() {
        assert_eq!(parse_input_line("/quit"), InputCommand::Quit);
        assert!(matches!(parse_input_line("/retry"), InputCommand::Invalid(_)));
    }
}
