//! Slash commands typed at the prompt.
//!
//! Anything that does not start with `/` is submitted to the backend
//! verbatim. Unknown slash input is reported locally and never sent.

use dreamterm::config::parse_feature_list;
use dreamterm::engine::QuickCommand;
use dreamterm::protocol::FeatureFlags;

pub(crate) const USAGE: &str = "commands: /init [voice,dataviz,dbquery], /clear, /help, \
/voice on|off, /listen, /stop-listening, /silence, /files, /memories, /viz, /db, \
/status, /dismiss, /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Submit(String),
    /// `None` falls back to the feature set from the CLI
    Initialize(Option<FeatureFlags>),
    Clear,
    VoiceOn,
    VoiceOff,
    Listen,
    StopListening,
    Silence,
    Quick(QuickCommand),
    Status,
    DismissBanner,
    Quit,
    Nothing,
    Invalid(String),
}

pub(crate) fn parse(line: &str) -> Action {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Action::Nothing;
    }
    if !trimmed.starts_with('/') {
        return Action::Submit(trimmed.to_string());
    }
    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (trimmed, ""),
    };
    match word {
        "/init" => {
            if rest.is_empty() {
                Action::Initialize(None)
            } else {
                match parse_feature_list(rest) {
                    Ok(features) => Action::Initialize(Some(features)),
                    Err(err) => Action::Invalid(format!("{err:#}")),
                }
            }
        }
        "/clear" => Action::Clear,
        // help is a backend command, not a local screen
        "/help" => Action::Submit("help".to_string()),
        "/voice" => match rest {
            "on" => Action::VoiceOn,
            "off" => Action::VoiceOff,
            _ => Action::Invalid("usage: /voice on|off".to_string()),
        },
        "/listen" => Action::Listen,
        "/stop-listening" => Action::StopListening,
        "/silence" => Action::Silence,
        "/files" => Action::Quick(QuickCommand::ListFiles),
        "/memories" => Action::Quick(QuickCommand::Memories),
        "/viz" => Action::Quick(QuickCommand::VizList),
        "/db" => Action::Quick(QuickCommand::DbList),
        "/status" => Action::Status,
        "/dismiss" => Action::DismissBanner,
        "/quit" | "/exit" => Action::Quit,
        other => Action::Invalid(format!("unknown command {other} ({USAGE})")),
    }
}
