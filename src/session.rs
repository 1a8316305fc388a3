//! Session lifecycle flags, passed explicitly to whoever needs them.

use serde::{Deserialize, Serialize};

/// Current session flags. Starts uninitialized with voice off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    initialized: bool,
    voice_enabled: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: SessionRecord) -> Self {
        Self {
            initialized: record.is_initialized,
            voice_enabled: record.is_voice_enabled,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    /// Flip to initialized, adopting the voice flag from the accepted
    /// feature set. One-way transition.
    pub fn mark_initialized(&mut self, voice_enabled: bool) {
        self.initialized = true;
        self.voice_enabled = voice_enabled;
    }

    pub fn set_voice_enabled(&mut self, enabled: bool) {
        self.voice_enabled = enabled;
    }

    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            is_initialized: self.initialized,
            is_voice_enabled: self.voice_enabled,
        }
    }
}

/// Persisted shape of the session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub is_initialized: bool,
    pub is_voice_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_uninitialized_with_voice_off() {
        let state = SessionState::new();
        assert!(!state.is_initialized());
        assert!(!state.voice_enabled());
    }

    #[test]
    fn mark_initialized_adopts_voice_flag() {
        let mut state = SessionState::new();
        state.mark_initialized(true);
        assert!(state.is_initialized());
        assert!(state.voice_enabled());

        let mut silent = SessionState::new();
        silent.mark_initialized(false);
        assert!(silent.is_initialized());
        assert!(!silent.voice_enabled());
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let mut state = SessionState::new();
        state.mark_initialized(true);
        let json = serde_json::to_string(&state.record()).unwrap();
        assert_eq!(json, r#"{"isInitialized":true,"isVoiceEnabled":true}"#);
    }

    #[test]
    fn state_round_trips_through_record() {
        let mut state = SessionState::new();
        state.mark_initialized(false);
        state.set_voice_enabled(true);
        let restored = SessionState::from_record(state.record());
        assert_eq!(restored, state);
    }
}
