use crate::error::{AgentError, AgentResult};

pub const HELP_TEXT: &str = "Commands:\n  \
/mode <name>  switch execution mode\n  \
/modes        list execution modes\n  \
/status       show mode, working directory and transcript size\n  \
/help         show this help\n  \
exit, quit    end the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Mode(String),
    Modes,
    Status,
    Help,
}

/// One line of interactive input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Exit,
    Empty,
    Command(SlashCommand),
    Prompt(String),
}

pub fn parse_input(line: &str) -> AgentResult<UserInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(UserInput::Empty);
    }
    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
        return Ok(UserInput::Exit);
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(UserInput::Prompt(trimmed.to_string()));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let argument = parts.next();
    let command = match (name, argument) {
        ("mode", Some(mode)) => SlashCommand::Mode(mode.to_string()),
        ("mode", None) => {
            return Err(AgentError::invalid_command("usage: /mode <name>"));
        }
        ("modes", _) => SlashCommand::Modes,
        ("status", _) => SlashCommand::Status,
        ("help", _) => SlashCommand::Help,
        _ => {
            return Err(AgentError::invalid_command(format!(
                "unknown command '/{name}'. Type /help for commands"
            )));
        }
    };
    Ok(UserInput::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_and_empty() {
        assert_eq!(parse_input("exit").unwrap(), UserInput::Exit);
        assert_eq!(parse_input("  QUIT \n").unwrap(), UserInput::Exit);
        assert_eq!(parse_input("   ").unwrap(), UserInput::Empty);
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(
            parse_input("/mode yolo").unwrap(),
            UserInput::Command(SlashCommand::Mode("yolo".into()))
        );
        assert_eq!(
            parse_input("/modes").unwrap(),
            UserInput::Command(SlashCommand::Modes)
        );
        assert_eq!(
            parse_input("/status").unwrap(),
            UserInput::Command(SlashCommand::Status)
        );
    }

    #[test]
    fn test_invalid_commands() {
        assert!(matches!(
            parse_input("/mode"),
            Err(AgentError::InvalidCommand { .. })
        ));
        let err = parse_input("/deploy now").unwrap_err();
        assert!(err.to_string().contains("/deploy"));
    }

    #[test]
    fn test_prompt_is_trimmed() {
        assert_eq!(
            parse_input("  list the files\n").unwrap(),
            UserInput::Prompt("list the files".into())
        );
    }
}
