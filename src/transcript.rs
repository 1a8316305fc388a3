//! Conversation transcript: entry kinds plus an append-only store.
//!
//! The store keeps the greeting apart from conversation entries so a clear
//! wipes the conversation but never the greeting. Snapshots serialize the
//! whole view for session persistence.

use crate::protocol::ReplyStatus;
use serde::{Deserialize, Serialize};

/// How a response concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

impl From<ReplyStatus> for Outcome {
    fn from(status: ReplyStatus) -> Self {
        match status {
            ReplyStatus::Success => Outcome::Success,
            ReplyStatus::Error => Outcome::Error,
        }
    }
}

/// Severity of a locally generated system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Command echoed back to the user at dispatch time
    Command { text: String },
    /// Backend reply to a command
    Response { text: String, outcome: Outcome },
    /// Locally generated notice (errors, lifecycle messages, greeting)
    System { text: String, severity: Severity },
}

impl TranscriptEntry {
    pub fn command(text: impl Into<String>) -> Self {
        TranscriptEntry::Command { text: text.into() }
    }

    pub fn response(text: impl Into<String>, outcome: Outcome) -> Self {
        TranscriptEntry::Response {
            text: text.into(),
            outcome,
        }
    }

    pub fn system(text: impl Into<String>, severity: Severity) -> Self {
        TranscriptEntry::System {
            text: text.into(),
            severity,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            TranscriptEntry::Command { text }
            | TranscriptEntry::Response { text, .. }
            | TranscriptEntry::System { text, .. } => text,
        }
    }

    /// Responses that look like markdown get richer rendering.
    pub fn wants_markdown(&self) -> bool {
        match self {
            TranscriptEntry::Response { text, .. } => looks_like_markdown(text),
            _ => false,
        }
    }
}

fn looks_like_markdown(text: &str) -> bool {
    text.contains("```") || text.contains('#') || text.contains('*') || text.contains('|')
}

/// Strip ANSI escapes and stray control sequences from backend reply text.
pub fn clean_reply(raw: &str) -> String {
    let ansi_free = strip_ansi_escapes::strip(raw.as_bytes());
    String::from_utf8_lossy(&ansi_free).trim_end().to_string()
}

// ============================================================================
// Store
// ============================================================================

/// Serialized transcript view, greeting included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    pub greeting_len: usize,
    pub entries: Vec<TranscriptEntry>,
}

/// Ordered transcript with a greeting prefix that survives clears.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    entries: Vec<TranscriptEntry>,
    greeting_len: usize,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            greeting_len: 0,
        }
    }

    pub fn with_greeting(text: &str) -> Self {
        Self {
            entries: vec![TranscriptEntry::system(text, Severity::Info)],
            greeting_len: 1,
        }
    }

    pub fn from_snapshot(snapshot: TranscriptSnapshot) -> Self {
        let greeting_len = snapshot.greeting_len.min(snapshot.entries.len());
        Self {
            entries: snapshot.entries,
            greeting_len,
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Remove everything except the greeting.
    pub fn clear(&mut self) {
        self.entries.truncate(self.greeting_len);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TranscriptEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            greeting_len: self.greeting_len,
            entries: self.entries.clone(),
        }
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}
