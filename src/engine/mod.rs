//! The session engine.
//!
//! Owns every moving part of a terminal session: the transcript, the
//! persisted session state, the command dispatcher, the connection monitor,
//! and the speech controller. The binary drives it from a single loop:
//! user actions call the public methods, and [`ConsoleEngine::pump`] drains
//! backend traffic and recognition results between keystrokes. Nothing in
//! here blocks.

use std::time::{Duration, Instant, SystemTime};

use crate::config::{AppConfig, DEFAULT_GREETING};
use crate::dispatch::{Completed, Dispatcher, ReplyMatch, SubmitError, DEFAULT_SOFT_TIMEOUT};
use crate::log_debug;
use crate::logging::log_debug_content;
use crate::monitor::{ConnectionMonitor, ConnectionStatus};
use crate::protocol::{BackendMessage, ClientMessage, FeatureFlags, ReplyStatus};
use crate::session::SessionState;
use crate::speech::{ListenState, RecognitionResult, SpeechController};
use crate::storage::{SessionStore, StoragePort};
use crate::telemetry;
use crate::transcript::{clean_reply, Outcome, Severity, TranscriptEntry, TranscriptStore};
use crate::transport::{Transport, TransportEvent};

#[cfg(test)]
mod tests;

// ============================================================================
// Status line
// ============================================================================

/// Tone of the one-line status strip under the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Current status strip contents.
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub message: String,
    pub changed_at: SystemTime,
}

impl StatusLine {
    fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            changed_at: SystemTime::now(),
        }
    }
}

/// What the busy indicator should say while a command is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingNotice {
    Processing,
    TakingLonger,
}

// ============================================================================
// Quick commands
// ============================================================================

/// Canned commands exposed as shortcuts. The text sent to the backend is
/// fixed so the shortcuts stay in step with what the backend parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickCommand {
    ListFiles,
    Memories,
    VizList,
    DbList,
}

impl QuickCommand {
    pub const ALL: [QuickCommand; 4] = [
        QuickCommand::ListFiles,
        QuickCommand::Memories,
        QuickCommand::VizList,
        QuickCommand::DbList,
    ];

    pub fn command_text(self) -> &'static str {
        match self {
            QuickCommand::ListFiles => "list files",
            QuickCommand::Memories => "memories",
            QuickCommand::VizList => "viz list",
            QuickCommand::DbList => "db list",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuickCommand::ListFiles => "Files",
            QuickCommand::Memories => "Memories",
            QuickCommand::VizList => "Visualizations",
            QuickCommand::DbList => "Database",
        }
    }
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Knobs the binary resolves before the engine starts.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub greeting: String,
    pub soft_timeout: Duration,
    /// Load saved session state on startup; `false` wipes it instead.
    pub restore: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
            restore: true,
        }
    }
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            soft_timeout: Duration::from_secs(config.soft_timeout_secs),
            restore: !config.fresh,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct ConsoleEngine {
    session: SessionState,
    transcript: TranscriptStore,
    dispatcher: Dispatcher,
    monitor: ConnectionMonitor,
    speech: SpeechController,
    transport: Box<dyn Transport>,
    store: SessionStore,
    status: StatusLine,
    init_pending: Option<FeatureFlags>,
    needs_redraw: bool,
}

impl ConsoleEngine {
    pub fn new(
        config: EngineConfig,
        transport: Box<dyn Transport>,
        storage: Box<dyn StoragePort>,
        speech: SpeechController,
    ) -> Self {
        let mut store = SessionStore::new(storage);
        if !config.restore {
            store.clear();
        }
        let restored = if config.restore { store.restore() } else { None };

        let (session, transcript, status) = match restored {
            Some(saved) => {
                let session = SessionState::from_record(saved.record);
                let transcript = match saved.transcript {
                    Some(snapshot) => TranscriptStore::from_snapshot(snapshot),
                    None => TranscriptStore::with_greeting(&config.greeting),
                };
                log_debug(&format!(
                    "restored session: initialized={} entries={}",
                    session.is_initialized(),
                    transcript.len()
                ));
                let status = if session.is_initialized() {
                    StatusLine::new(StatusKind::Info, "Session restored")
                } else {
                    StatusLine::new(StatusKind::Info, "Awaiting initialization")
                };
                (session, transcript, status)
            }
            None => (
                SessionState::new(),
                TranscriptStore::with_greeting(&config.greeting),
                StatusLine::new(StatusKind::Info, "Awaiting initialization"),
            ),
        };

        Self {
            session,
            transcript,
            dispatcher: Dispatcher::new(config.soft_timeout),
            monitor: ConnectionMonitor::new(),
            speech,
            transport,
            store,
            status,
            init_pending: None,
            needs_redraw: true,
        }
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.monitor.status()
    }

    pub fn banner_visible(&self) -> bool {
        self.monitor.banner_visible()
    }

    /// True until initialization succeeds; gates command submission.
    pub fn needs_initialization(&self) -> bool {
        !self.session.is_initialized()
    }

    pub fn voice_enabled(&self) -> bool {
        self.session.voice_enabled()
    }

    pub fn is_busy(&self) -> bool {
        self.dispatcher.is_busy()
    }

    pub fn pending_notice(&self) -> Option<PendingNotice> {
        let in_flight = self.dispatcher.in_flight()?;
        Some(if in_flight.slow_notice_sent() {
            PendingNotice::TakingLonger
        } else {
            PendingNotice::Processing
        })
    }

    pub fn can_listen(&self) -> bool {
        self.speech.can_listen()
    }

    pub fn can_speak(&self) -> bool {
        self.speech.can_speak()
    }

    pub fn listen_state(&self) -> ListenState {
        self.speech.listen_state()
    }

    /// One-shot redraw flag for the render loop.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Ask the backend to set up a session with the given feature set.
    /// The result lands asynchronously via [`ConsoleEngine::pump`].
    pub fn initialize(&mut self, features: FeatureFlags) {
        if self.init_pending.is_some() {
            self.update_status(StatusKind::Warning, "Initialization already in progress");
            return;
        }
        match self.transport.send(&ClientMessage::Init { features }) {
            Ok(()) => {
                self.init_pending = Some(features);
                self.update_status(StatusKind::Warning, "Initializing session...");
            }
            Err(err) => {
                log_debug(&format!("init send failed: {err:#}"));
                self.push_entry(TranscriptEntry::system(
                    format!("Error initializing session: {err:#}"),
                    Severity::Error,
                ));
                self.update_status(StatusKind::Error, "Initialization failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Command submission
    // ------------------------------------------------------------------

    /// Send a command line to the backend. Precondition failures surface as
    /// transcript entries; the reply arrives later through `pump`.
    pub fn submit(&mut self, text: &str) {
        let echoed = text.trim().to_string();
        match self
            .dispatcher
            .submit(text, &self.session, self.transport.as_mut())
        {
            Ok(request_id) => {
                log_debug(&format!("command {request_id} dispatched"));
                log_debug_content(&format!("command {request_id}: {echoed}"));
                self.push_entry(TranscriptEntry::command(echoed));
                self.update_status(StatusKind::Warning, "Processing command...");
            }
            Err(SubmitError::EmptyCommand) => {
                self.push_entry(TranscriptEntry::system(
                    "Cannot send an empty command.",
                    Severity::Error,
                ));
                self.update_status(StatusKind::Error, "Nothing to send");
            }
            Err(SubmitError::NotInitialized) => {
                self.push_entry(TranscriptEntry::system(
                    "Initialize the session before sending commands.",
                    Severity::Error,
                ));
                self.update_status(StatusKind::Error, "Not initialized");
            }
            Err(SubmitError::CommandInFlight) => {
                self.update_status(StatusKind::Warning, "A command is already running");
            }
            Err(SubmitError::Transport(message)) => {
                // The echo lands first so the failed attempt stays visible.
                self.push_entry(TranscriptEntry::command(echoed));
                self.push_entry(TranscriptEntry::system(
                    format!("Error sending command: {message}"),
                    Severity::Error,
                ));
                self.update_status(StatusKind::Error, "Command failed to send");
            }
        }
    }

    pub fn quick(&mut self, command: QuickCommand) {
        self.submit(command.command_text());
    }

    // ------------------------------------------------------------------
    // Transcript and voice toggles
    // ------------------------------------------------------------------

    /// Drop everything except the greeting.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.persist();
        self.update_status(StatusKind::Info, "Transcript cleared");
        self.needs_redraw = true;
    }

    /// Toggle whether replies are read aloud. Does not interrupt an
    /// utterance already playing.
    pub fn set_voice(&mut self, enabled: bool) {
        self.session.set_voice_enabled(enabled);
        self.persist();
        let message = if enabled {
            "Voice output enabled"
        } else {
            "Voice output disabled"
        };
        self.update_status(StatusKind::Info, message);
    }

    pub fn toggle_voice(&mut self) -> bool {
        let enabled = !self.session.voice_enabled();
        self.set_voice(enabled);
        enabled
    }

    // ------------------------------------------------------------------
    // Speech
    // ------------------------------------------------------------------

    pub fn start_listening(&mut self) {
        if !self.speech.can_listen() {
            self.update_status(StatusKind::Warning, "Speech recognition is not available");
            return;
        }
        match self.speech.start_listening() {
            Ok(true) => self.update_status(StatusKind::Warning, "Listening..."),
            Ok(false) => {}
            Err(err) => {
                self.update_status(StatusKind::Error, format!("Speech recognition error: {err:#}"));
            }
        }
    }

    pub fn stop_listening(&mut self) {
        self.speech.stop_listening();
        self.update_status(StatusKind::Success, "Ready");
    }

    pub fn stop_speech(&mut self) {
        self.speech.stop_speech();
        self.update_status(StatusKind::Info, "Speech stopped");
    }

    // ------------------------------------------------------------------
    // Banner
    // ------------------------------------------------------------------

    pub fn dismiss_banner(&mut self) {
        self.monitor.dismiss_banner();
        self.needs_redraw = true;
    }

    // ------------------------------------------------------------------
    // Pump
    // ------------------------------------------------------------------

    /// Drain backend events and recognition results, then check the soft
    /// timeout. Call this on every tick of the UI loop.
    pub fn pump(&mut self) {
        while let Some(event) = self.transport.try_recv() {
            self.handle_transport_event(event);
        }
        if let Some(result) = self.speech.poll_recognition() {
            self.handle_recognition(result);
        }
        let now = Instant::now();
        let slow = self
            .dispatcher
            .poll_slow_notice(now)
            .map(|in_flight| (in_flight.request_id(), in_flight.elapsed(now)));
        if let Some((request_id, elapsed)) = slow {
            log_debug(&format!(
                "command {request_id} still pending after {}ms",
                elapsed.as_millis()
            ));
            self.update_status(
                StatusKind::Warning,
                "Command is taking longer than expected...",
            );
        }
    }

    /// Flush session state before the process exits.
    pub fn shutdown(&mut self) {
        self.persist();
        self.speech.stop_listening();
        self.speech.stop_speech();
    }

    // ------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.monitor.on_connected() {
                    self.update_status(StatusKind::Success, "Connected to backend");
                }
            }
            TransportEvent::Disconnected => {
                self.monitor.on_disconnected();
                self.update_status(StatusKind::Error, "Disconnected from backend");
                self.abandon_in_flight();
            }
            TransportEvent::ConnectError { message } => {
                log_debug(&format!("backend connection error: {message}"));
                self.monitor.on_connect_error();
                self.update_status(StatusKind::Error, "Connection error");
            }
            TransportEvent::Message(message) => self.handle_backend_message(message),
        }
    }

    fn handle_backend_message(&mut self, message: BackendMessage) {
        match message {
            BackendMessage::InitResult { status, message } => {
                self.handle_init_result(status, message);
            }
            BackendMessage::CommandResponse {
                id,
                command: _,
                response,
                status,
                message,
            } => self.handle_command_response(id, response, status, message),
        }
    }

    fn handle_init_result(&mut self, status: ReplyStatus, message: Option<String>) {
        let Some(features) = self.init_pending.take() else {
            log_debug("dropping init result with no pending initialization");
            return;
        };
        if status.is_success() {
            self.session.mark_initialized(features.enable_voice);
            self.push_entry(TranscriptEntry::system(
                format!("Session initialized with features: {}", features.summary()),
                Severity::Info,
            ));
            self.update_status(StatusKind::Success, "Session initialized");
        } else {
            let reason = message.unwrap_or_else(|| "unknown error".to_string());
            self.push_entry(TranscriptEntry::system(
                format!("Initialization failed: {reason}"),
                Severity::Error,
            ));
            self.update_status(StatusKind::Error, "Initialization failed");
        }
    }

    fn handle_command_response(
        &mut self,
        id: Option<u64>,
        response: String,
        status: ReplyStatus,
        message: Option<String>,
    ) {
        match self.dispatcher.accept_reply(id) {
            ReplyMatch::Completed(done) => self.finish_command(done, response, status, message),
            ReplyMatch::Stale { reply_id } => {
                log_debug(&format!("dropping stale reply for request {reply_id}"));
            }
            ReplyMatch::Unsolicited => log_debug("dropping reply with no command in flight"),
        }
    }

    fn finish_command(
        &mut self,
        done: Completed,
        response: String,
        status: ReplyStatus,
        message: Option<String>,
    ) {
        telemetry::record_round_trip(done.request_id, done.elapsed);
        log_debug(&format!(
            "command {} completed in {}ms",
            done.request_id,
            done.elapsed.as_millis()
        ));

        // Error replies from older backends carry `message` instead of
        // `response`.
        let text = if response.is_empty() {
            clean_reply(&message.unwrap_or_default())
        } else {
            clean_reply(&response)
        };
        let shown = if text.is_empty() {
            "(no response)".to_string()
        } else {
            text.clone()
        };
        self.push_entry(TranscriptEntry::response(shown, Outcome::from(status)));

        if status.is_success() {
            self.update_status(StatusKind::Success, "Command completed");
        } else {
            self.update_status(StatusKind::Error, "Command returned an error");
        }

        if self.session.voice_enabled() && self.speech.can_speak() && !text.is_empty() {
            if let Err(err) = self.speech.speak(&text) {
                log_debug(&format!("speak failed: {err:#}"));
            }
        }
    }

    fn handle_recognition(&mut self, result: RecognitionResult) {
        match result {
            RecognitionResult::Transcript(text) => {
                log_debug_content(&format!("recognized speech: {text}"));
                self.submit(&text);
            }
            RecognitionResult::Empty => {
                self.update_status(StatusKind::Success, "Ready");
            }
            RecognitionResult::Error(message) => {
                self.update_status(
                    StatusKind::Error,
                    format!("Speech recognition error: {message}"),
                );
            }
        }
    }

    fn abandon_in_flight(&mut self) {
        if self.init_pending.take().is_some() {
            self.push_entry(TranscriptEntry::system(
                "Initialization failed: backend disconnected",
                Severity::Error,
            ));
        }
        if let Some(dropped) = self.dispatcher.abandon() {
            log_debug(&format!(
                "abandoning command {} after disconnect",
                dropped.request_id
            ));
            self.push_entry(TranscriptEntry::system(
                format!("Connection lost while waiting for \"{}\"", dropped.command),
                Severity::Error,
            ));
        }
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn push_entry(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
        self.persist();
        self.needs_redraw = true;
    }

    fn update_status(&mut self, kind: StatusKind, message: impl Into<String>) {
        self.status = StatusLine::new(kind, message);
        self.needs_redraw = true;
    }

    fn persist(&mut self) {
        self.store
            .save(&self.session.record(), &self.transcript.snapshot());
    }
}
