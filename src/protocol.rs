//! JSON wire protocol spoken with the assistant backend.
//!
//! Messages travel as newline-delimited JSON over the backend transport.
//! Outbound messages carry a `"cmd"` tag, inbound messages an `"event"` tag.

use serde::{Deserialize, Serialize};

// ============================================================================
// Feature flags
// ============================================================================

/// Feature selection sent with the initialization request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub enable_voice: bool,
    pub enable_dataviz: bool,
    pub enable_dbquery: bool,
}

impl FeatureFlags {
    pub fn all() -> Self {
        Self {
            enable_voice: true,
            enable_dataviz: true,
            enable_dbquery: true,
        }
    }

    /// Human-readable list of the enabled features, `"none"` when empty.
    pub fn summary(&self) -> String {
        let mut enabled = Vec::new();
        if self.enable_voice {
            enabled.push("voice");
        }
        if self.enable_dataviz {
            enabled.push("dataviz");
        }
        if self.enable_dbquery {
            enabled.push("dbquery");
        }
        if enabled.is_empty() {
            "none".to_string()
        } else {
            enabled.join(", ")
        }
    }
}

// ============================================================================
// Client messages (terminal → backend)
// ============================================================================

/// Requests sent to the backend.
///
/// Serialized as JSON with a `"cmd"` tag field for type discrimination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd")]
pub enum ClientMessage {
    /// One-shot session initialization with the requested feature set
    #[serde(rename = "init")]
    Init { features: FeatureFlags },

    /// User command; `id` correlates the eventual reply
    #[serde(rename = "command")]
    Command { id: u64, command: String },
}

// ============================================================================
// Backend messages (backend → terminal)
// ============================================================================

/// Outcome field carried by backend replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    Error,
}

impl ReplyStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ReplyStatus::Success)
    }
}

/// Events emitted by the backend.
///
/// Deserialized from JSON with an `"event"` tag field. Unknown fields are
/// ignored so older terminals keep working against newer backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum BackendMessage {
    /// Reply to the initialization request
    #[serde(rename = "init_result")]
    InitResult {
        status: ReplyStatus,
        #[serde(default)]
        message: Option<String>,
    },

    /// Reply to a dispatched command. `id` is absent when talking to
    /// backends that predate reply correlation.
    #[serde(rename = "command_response")]
    CommandResponse {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        command: String,
        #[serde(default)]
        response: String,
        status: ReplyStatus,
        /// Error detail some backends send instead of `response`
        #[serde(default)]
        message: Option<String>,
    },
}

impl BackendMessage {
    /// Parse one newline-delimited JSON line from the backend.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
