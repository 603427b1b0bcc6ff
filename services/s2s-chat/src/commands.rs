//! Parsing of the lines typed at the prompt.

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Starts a conversation when idle, ends it otherwise.
    ToggleMic,
    Model(String),
    Voice(String),
    Voices,
    Prompt(String),
    Save,
    ShowConfig,
    Help,
    Quit,
    /// Anything that is not a command.
    Chat(String),
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /start           start a voice conversation
  /stop            end the conversation
  /mic             toggle the conversation on or off
  /model <id>      choose the speech-to-speech model
  /voice <id>      choose the AI voice
  /voices          list the available voices
  /prompt <text>   set the system prompt
  /save            save the settings
  /config          show the current settings
  /help            show this help
  /quit            exit
Any other text is added to the chat log.";

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(body) = trimmed.strip_prefix('/') else {
            return Command::Chat(line.to_string());
        };
        let (name, arg) = match body.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (body, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "mic" => Command::ToggleMic,
            "model" => Command::Model(arg.to_string()),
            "voice" => Command::Voice(arg.to_string()),
            "voices" => Command::Voices,
            "prompt" => Command::Prompt(arg.to_string()),
            "save" => Command::Save,
            "config" => Command::ShowConfig,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("  /stop  "), Command::Stop);
        assert_eq!(Command::parse("/mic"), Command::ToggleMic);
        assert_eq!(Command::parse("/voices"), Command::Voices);
        assert_eq!(Command::parse("/save"), Command::Save);
        assert_eq!(Command::parse("/config"), Command::ShowConfig);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("/QUIT"), Command::Quit);
        assert_eq!(Command::parse("/exit"), Command::Quit);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            Command::parse("/model gpt-realtime"),
            Command::Model("gpt-realtime".to_string())
        );
        assert_eq!(Command::parse("/voice  coral "), Command::Voice("coral".to_string()));
        assert_eq!(
            Command::parse("/prompt Be brief.  Answer in French."),
            Command::Prompt("Be brief.  Answer in French.".to_string())
        );
        assert_eq!(Command::parse("/model"), Command::Model(String::new()));
    }

    #[test]
    fn test_parse_falls_back_to_chat() {
        assert_eq!(Command::parse("hello"), Command::Chat("hello".to_string()));
        assert_eq!(Command::parse("  hi "), Command::Chat("  hi ".to_string()));
        assert_eq!(Command::parse(""), Command::Chat(String::new()));
        assert_eq!(
            Command::parse("/frobnicate now"),
            Command::Unknown("frobnicate".to_string())
        );
    }
}
