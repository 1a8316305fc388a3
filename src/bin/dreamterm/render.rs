//! Plain-line rendering for transcript entries, the status strip, and the
//! connection banner. Color is 16-color ANSI, disabled for pipes, `NO_COLOR`,
//! and dumb terminals.

use crossterm::tty::IsTty;
use dreamterm::engine::{StatusKind, StatusLine};
use dreamterm::monitor::ConnectionStatus;
use dreamterm::transcript::{Outcome, Severity, TranscriptEntry};
use std::env;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[90m";
const RED: &str = "\x1b[31m";
const BOLD_RED: &str = "\x1b[1;31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Palette {
    enabled: bool,
}

impl Palette {
    pub(crate) fn detect() -> Self {
        let enabled = env::var_os("NO_COLOR").is_none()
            && env::var("TERM").map(|term| term != "dumb").unwrap_or(true)
            && io::stdout().is_tty();
        Self { enabled }
    }

    #[cfg(test)]
    fn plain() -> Self {
        Self { enabled: false }
    }

    #[cfg(test)]
    fn colored() -> Self {
        Self { enabled: true }
    }

    fn paint(self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

/// One printable line (possibly multi-line for long responses).
pub(crate) fn entry_line(palette: Palette, entry: &TranscriptEntry) -> String {
    match entry {
        TranscriptEntry::Command { text } => {
            format!("{} {text}", palette.paint(CYAN, ">"))
        }
        TranscriptEntry::Response { text, outcome } => match outcome {
            Outcome::Success => text.clone(),
            Outcome::Error => palette.paint(RED, text),
        },
        TranscriptEntry::System { text, severity } => {
            let code = match severity {
                Severity::Info => DIM,
                Severity::Warning => YELLOW,
                Severity::Error => RED,
            };
            palette.paint(code, &format!("* {text}"))
        }
    }
}

pub(crate) fn status_line(palette: Palette, status: &StatusLine) -> String {
    let (code, symbol) = match status.kind {
        StatusKind::Info => (DIM, "-"),
        StatusKind::Success => (GREEN, "+"),
        StatusKind::Warning => (YELLOW, "~"),
        StatusKind::Error => (RED, "!"),
    };
    format!(
        "{} {} {}",
        palette.paint(DIM, &format!("[{}]", clock_label(status.changed_at))),
        palette.paint(code, symbol),
        status.message
    )
}

pub(crate) fn banner_line(palette: Palette, status: ConnectionStatus) -> String {
    let text = format!(
        "backend {}: commands will fail until dreamterm is restarted (/dismiss to hide)",
        status.label()
    );
    palette.paint(BOLD_RED, &text)
}

/// Local feedback that never enters the transcript (usage errors and such).
pub(crate) fn notice_line(palette: Palette, text: &str) -> String {
    palette.paint(YELLOW, text)
}

pub(crate) fn prompt_label(busy: bool, listening: bool) -> &'static str {
    if listening {
        "(listening) dream> "
    } else if busy {
        "dream... "
    } else {
        "dream> "
    }
}

/// Wall-clock `HH:MM:SS` in UTC.
fn clock_label(at: SystemTime) -> String {
    let secs_of_day = at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() % 86_400)
        .unwrap_or(0);
    format!(
        "{:02}:{:02}:{:02}",
        secs_of_day / 3600,
        (secs_of_day / 60) % 60,
        secs_of_day % 60
    )
}
