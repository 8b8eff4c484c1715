//! Input line parsing
//!
//! Plain lines are messages to the current persona. Lines starting with `/`
//! are commands.

use companion_core::PersonaId;

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a message to the current persona
    Say(String),
    /// Start a new conversation with one persona (or all)
    New(Option<PersonaId>),
    /// Switch the persona being addressed
    Persona(PersonaId),
    /// Stop revealing the current reply
    Cancel,
    /// Re-fetch quota
    Refresh,
    /// Print the current quota
    Quota,
    /// Print the command list
    Help,
    /// Close the view and exit
    Quit,
    /// Nothing to do (blank line)
    Empty,
    /// Unrecognised command
    Unknown(String),
}

/// Parse a line read from the terminal
pub fn parse_line(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(PersonaId::from);

    match name {
        "new" => Command::New(arg),
        "persona" | "p" => match arg {
            Some(persona) => Command::Persona(persona),
            None => Command::Unknown(line.to_string()),
        },
        "cancel" | "stop" => Command::Cancel,
        "refresh" => Command::Refresh,
        "quota" => Command::Quota,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Command summary printed by `/help`
pub const HELP: &str = "\
commands:
  /persona <id>   talk to another persona
  /new [id]       start a new conversation (one persona, or all)
  /cancel         stop the reply being revealed
  /refresh        re-fetch quota
  /quota          show remaining turns
  /quit           leave";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(parse_line("  hello there "), Command::Say("hello there".into()));
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_line("/new"), Command::New(None));
        assert_eq!(parse_line("/new luna"), Command::New(Some("luna".into())));
        assert_eq!(parse_line("/p sol"), Command::Persona("sol".into()));
        assert_eq!(parse_line("/stop"), Command::Cancel);
        assert_eq!(parse_line("/quit"), Command::Quit);
        assert_eq!(parse_line(""), Command::Empty);
    }

    #[test]
    fn test_persona_requires_an_argument() {
        assert_eq!(parse_line("/persona"), Command::Unknown("/persona".into()));
        assert_eq!(parse_line("/dance"), Command::Unknown("/dance".into()));
    }
}
