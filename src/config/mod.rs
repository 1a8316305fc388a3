//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::env;
use std::path::PathBuf;

use crate::protocol::FeatureFlags;
use crate::speech::SpeechConfig;
pub use defaults::{
    DEFAULT_BACKEND_CMD, DEFAULT_FEATURES, DEFAULT_GREETING, DEFAULT_LOCALE,
    DEFAULT_SOFT_TIMEOUT_SECS, DEFAULT_SPEECH_MAX_CHARS, MAX_SOFT_TIMEOUT_SECS,
    MAX_SPEECH_MAX_CHARS, MIN_SOFT_TIMEOUT_SECS, MIN_SPEECH_MAX_CHARS,
};
pub use validation::parse_feature_list;

/// CLI options for the dreamterm console. Validated values keep the
/// backend and speech helper subprocesses safe to launch.
#[derive(Debug, Parser, Clone)]
#[command(about = "DreamOS terminal console", author, version)]
pub struct AppConfig {
    /// Backend executable spoken to over stdin/stdout
    #[arg(long = "backend-cmd", env = "DREAMTERM_BACKEND", default_value = DEFAULT_BACKEND_CMD)]
    pub backend_cmd: String,

    /// Extra arguments passed to the backend (repeatable)
    #[arg(long = "backend-arg", action = ArgAction::Append, value_name = "ARG")]
    pub backend_args: Vec<String>,

    /// Feature set requested at initialization, comma-separated
    /// (voice, dataviz, dbquery)
    #[arg(long = "features", default_value = DEFAULT_FEATURES)]
    pub features: String,

    /// Recognition locale, e.g. en-US
    #[arg(long = "locale", default_value = DEFAULT_LOCALE)]
    pub locale: String,

    /// Seconds before a waiting command gets the slow-response notice
    #[arg(long = "soft-timeout-secs", default_value_t = DEFAULT_SOFT_TIMEOUT_SECS)]
    pub soft_timeout_secs: u64,

    /// Longest reply read aloud before truncation
    #[arg(long = "speech-max-chars", default_value_t = DEFAULT_SPEECH_MAX_CHARS)]
    pub speech_max_chars: usize,

    /// Synthesizer voice bound by name when available
    #[arg(long = "preferred-voice")]
    pub preferred_voice: Option<String>,

    /// Speech recognizer command; prints one transcript on stdout and
    /// receives the locale as its final argument
    #[arg(long = "stt-cmd", env = "DREAMTERM_STT_CMD")]
    pub stt_cmd: Option<String>,

    /// Speech synthesizer command; receives the text as its final argument
    #[arg(long = "tts-cmd", env = "DREAMTERM_TTS_CMD")]
    pub tts_cmd: Option<String>,

    /// Voices the synthesizer offers, comma-separated NAME[:LOCALE] pairs
    #[arg(long = "tts-voices", value_name = "LIST")]
    pub tts_voices: Option<String>,

    /// Directory holding the persisted session
    #[arg(long = "state-dir", env = "DREAMTERM_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Keep the session in memory only
    #[arg(long = "no-persist", default_value_t = false)]
    pub no_persist: bool,

    /// Discard any persisted session at startup
    #[arg(long = "fresh", default_value_t = false)]
    pub fresh: bool,

    /// Print environment diagnostics and exit
    #[arg(long = "doctor", default_value_t = false)]
    pub doctor: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "DREAMTERM_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "DREAMTERM_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging command/reply snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "DREAMTERM_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

impl AppConfig {
    /// Feature flags parsed from `--features`. Call after `validate`.
    pub fn feature_flags(&self) -> FeatureFlags {
        parse_feature_list(&self.features).unwrap_or_default()
    }

    /// Snapshot of everything the speech subsystem needs. Call after
    /// `validate`; the commands in here have been checked.
    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            locale: self.locale.clone(),
            max_speak_chars: self.speech_max_chars,
            preferred_voice: self.preferred_voice.clone(),
            stt_command: self
                .stt_cmd
                .as_deref()
                .and_then(|raw| shell_words::split(raw).ok())
                .filter(|argv| !argv.is_empty()),
            tts_command: self
                .tts_cmd
                .as_deref()
                .and_then(|raw| shell_words::split(raw).ok())
                .filter(|argv| !argv.is_empty()),
            voices: self
                .tts_voices
                .as_deref()
                .map(|raw| validation::parse_voice_list(raw, &self.locale))
                .transpose()
                .ok()
                .flatten()
                .unwrap_or_default(),
        }
    }

    /// Where session state lives when persistence is on.
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("dreamterm-state"))
    }
}
