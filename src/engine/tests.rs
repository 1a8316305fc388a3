use super::*;
use crate::protocol::ReplyStatus;
use crate::speech::testing::{FakeSpeechPort, SpeechCall};
use crate::speech::SpeechConfig;
use crate::storage::{FileStore, MemoryStore};
use crate::transport::testing::ScriptedTransport;
use anyhow::{bail, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const GREETING: &str = "Welcome back.";

struct Harness {
    engine: ConsoleEngine,
    transport: ScriptedTransport,
    speech_calls: Arc<Mutex<Vec<SpeechCall>>>,
}

fn test_config() -> EngineConfig {
    EngineConfig {
        greeting: GREETING.to_string(),
        soft_timeout: Duration::from_secs(15),
        restore: false,
    }
}

fn speech_config() -> SpeechConfig {
    SpeechConfig {
        locale: "en-US".to_string(),
        max_speak_chars: 200,
        ..SpeechConfig::default()
    }
}

fn harness() -> Harness {
    harness_with(FakeSpeechPort::new(), test_config())
}

fn harness_with(port: FakeSpeechPort, config: EngineConfig) -> Harness {
    let transport = ScriptedTransport::new();
    let speech_calls = port.calls_handle();
    let speech = SpeechController::new(Box::new(port), &speech_config());
    let engine = ConsoleEngine::new(
        config,
        Box::new(transport.clone()),
        Box::new(MemoryStore::new()),
        speech,
    );
    Harness {
        engine,
        transport,
        speech_calls,
    }
}

fn connect_and_init(harness: &mut Harness, features: FeatureFlags) {
    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();
    harness.engine.initialize(features);
    harness.transport.push_event(TransportEvent::Message(BackendMessage::InitResult {
        status: ReplyStatus::Success,
        message: None,
    }));
    harness.engine.pump();
}

fn initialized_harness() -> Harness {
    let mut harness = harness();
    connect_and_init(&mut harness, FeatureFlags::all());
    harness
}

fn push_reply(transport: &ScriptedTransport, id: Option<u64>, response: &str, status: ReplyStatus) {
    transport.push_event(TransportEvent::Message(BackendMessage::CommandResponse {
        id,
        command: String::new(),
        response: response.to_string(),
        status,
        message: None,
    }));
}

fn complete_round_trip(harness: &mut Harness, command: &str, response: &str) {
    harness.engine.submit(command);
    let id = harness.transport.last_command_id();
    push_reply(&harness.transport, id, response, ReplyStatus::Success);
    harness.engine.pump();
}

fn sent_commands(transport: &ScriptedTransport) -> Vec<String> {
    transport
        .sent()
        .into_iter()
        .filter_map(|msg| match msg {
            ClientMessage::Command { command, .. } => Some(command),
            _ => None,
        })
        .collect()
}

fn sent_inits(transport: &ScriptedTransport) -> usize {
    transport
        .sent()
        .iter()
        .filter(|msg| matches!(msg, ClientMessage::Init { .. }))
        .count()
}

fn speaks(calls: &Arc<Mutex<Vec<SpeechCall>>>) -> Vec<String> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            SpeechCall::Speak { text, .. } => Some(text.clone()),
            SpeechCall::Cancel => None,
        })
        .collect()
}

fn temp_state_dir(tag: &str) -> PathBuf {
    env::temp_dir().join(format!("dreamterm-engine-{tag}-{}", std::process::id()))
}

// ============================================================================
// Startup and initialization
// ============================================================================

#[test]
fn starts_fresh_with_greeting_and_closed_gate() {
    let harness = harness();
    assert!(harness.engine.needs_initialization());
    assert!(!harness.engine.voice_enabled());
    assert_eq!(harness.engine.transcript().len(), 1);
    match harness.engine.transcript().get(0) {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, GREETING);
            assert_eq!(*severity, Severity::Info);
        }
        other => panic!("expected greeting, got {other:?}"),
    }
    assert_eq!(harness.engine.connection(), ConnectionStatus::Disconnected);
    assert!(!harness.engine.banner_visible());
}

#[test]
fn successful_init_opens_gate_and_records_features() {
    let mut harness = harness();
    connect_and_init(&mut harness, FeatureFlags::all());

    assert!(!harness.engine.needs_initialization());
    assert!(harness.engine.voice_enabled());
    assert_eq!(sent_inits(&harness.transport), 1);
    match harness.transport.sent().first() {
        Some(ClientMessage::Init { features }) => assert_eq!(*features, FeatureFlags::all()),
        other => panic!("expected init message, got {other:?}"),
    }
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, "Session initialized with features: voice, dataviz, dbquery");
            assert_eq!(*severity, Severity::Info);
        }
        other => panic!("expected init notice, got {other:?}"),
    }
    assert_eq!(harness.engine.status().kind, StatusKind::Success);
}

#[test]
fn failed_init_keeps_gate_closed_and_allows_retry() {
    let mut harness = harness();
    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();
    harness.engine.initialize(FeatureFlags::all());
    harness.transport.push_line(
        r#"{"event":"init_result","status":"error","message":"backend not ready"}"#,
    );
    harness.engine.pump();

    assert!(harness.engine.needs_initialization());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, "Initialization failed: backend not ready");
            assert_eq!(*severity, Severity::Error);
        }
        other => panic!("expected failure notice, got {other:?}"),
    }

    harness.engine.initialize(FeatureFlags::all());
    harness.transport.push_line(r#"{"event":"init_result","status":"success"}"#);
    harness.engine.pump();
    assert!(!harness.engine.needs_initialization());
}

#[test]
fn duplicate_init_request_is_sent_once() {
    let mut harness = harness();
    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();
    harness.engine.initialize(FeatureFlags::all());
    harness.engine.initialize(FeatureFlags::all());

    assert_eq!(sent_inits(&harness.transport), 1);
    assert_eq!(harness.engine.status().kind, StatusKind::Warning);
    assert_eq!(harness.engine.status().message, "Initialization already in progress");
}

#[test]
fn init_send_failure_is_reported_inline() {
    let mut harness = harness();
    harness.transport.fail_next_send("backend unreachable");
    harness.engine.initialize(FeatureFlags::all());

    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert!(text.starts_with("Error initializing session:"), "got {text}");
            assert_eq!(*severity, Severity::Error);
        }
        other => panic!("expected send failure notice, got {other:?}"),
    }
    // the slot is free again, so a retry goes out
    harness.engine.initialize(FeatureFlags::all());
    assert_eq!(sent_inits(&harness.transport), 1);
}

// ============================================================================
// Command submission
// ============================================================================

#[test]
fn empty_submission_never_dispatches() {
    let mut harness = initialized_harness();
    let before = harness.engine.transcript().len();

    harness.engine.submit("   ");

    assert!(sent_commands(&harness.transport).is_empty());
    assert_eq!(harness.engine.transcript().len(), before + 1);
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, "Cannot send an empty command.");
            assert_eq!(*severity, Severity::Error);
        }
        other => panic!("expected system error, got {other:?}"),
    }
    assert!(!harness.engine.is_busy());
}

#[test]
fn submission_before_init_is_refused_without_dispatch() {
    let mut harness = harness();
    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();

    harness.engine.submit("status");

    assert!(sent_commands(&harness.transport).is_empty());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, "Initialize the session before sending commands.");
            assert_eq!(*severity, Severity::Error);
        }
        other => panic!("expected system error, got {other:?}"),
    }
}

#[test]
fn command_round_trip_appends_echo_then_response() {
    let mut harness = initialized_harness();

    harness.engine.submit("status");
    assert!(harness.engine.is_busy());
    assert_eq!(harness.engine.pending_notice(), Some(PendingNotice::Processing));
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Command { text }) => assert_eq!(text, "status"),
        other => panic!("expected command echo, got {other:?}"),
    }
    assert_eq!(harness.engine.status().message, "Processing command...");

    let id = harness.transport.last_command_id();
    push_reply(&harness.transport, id, "All systems nominal", ReplyStatus::Success);
    harness.engine.pump();

    assert!(!harness.engine.is_busy());
    assert_eq!(harness.engine.pending_notice(), None);
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, outcome }) => {
            assert_eq!(text, "All systems nominal");
            assert_eq!(*outcome, Outcome::Success);
        }
        other => panic!("expected response, got {other:?}"),
    }
    assert_eq!(harness.engine.status().kind, StatusKind::Success);
}

#[test]
fn second_submission_is_refused_while_one_is_in_flight() {
    let mut harness = initialized_harness();
    let before = harness.engine.transcript().len();

    harness.engine.submit("first");
    harness.engine.submit("second");

    assert_eq!(sent_commands(&harness.transport), ["first"]);
    assert_eq!(harness.engine.transcript().len(), before + 1);
    assert_eq!(harness.engine.status().message, "A command is already running");

    let id = harness.transport.last_command_id();
    push_reply(&harness.transport, id, "done", ReplyStatus::Success);
    harness.engine.pump();

    harness.engine.submit("second");
    assert_eq!(sent_commands(&harness.transport), ["first", "second"]);
}

#[test]
fn sequential_round_trips_alternate_strictly() {
    let mut harness = initialized_harness();
    let base = harness.engine.transcript().len();

    for round in 0..3 {
        complete_round_trip(&mut harness, &format!("cmd-{round}"), &format!("reply {round}"));
    }

    let entries: Vec<_> = harness.engine.transcript().iter().skip(base).collect();
    assert_eq!(entries.len(), 6);
    for (index, entry) in entries.iter().enumerate() {
        let round = index / 2;
        if index % 2 == 0 {
            match entry {
                TranscriptEntry::Command { text } => assert_eq!(*text, format!("cmd-{round}")),
                other => panic!("expected command at {index}, got {other:?}"),
            }
        } else {
            match entry {
                TranscriptEntry::Response { text, outcome } => {
                    assert_eq!(*text, format!("reply {round}"));
                    assert_eq!(*outcome, Outcome::Success);
                }
                other => panic!("expected response at {index}, got {other:?}"),
            }
        }
    }
}

#[test]
fn error_reply_uses_message_detail_when_response_is_empty() {
    let mut harness = initialized_harness();
    harness.engine.submit("db query");
    let id = harness.transport.last_command_id().unwrap();
    harness.transport.push_line(&format!(
        r#"{{"event":"command_response","id":{id},"status":"error","message":"db offline"}}"#
    ));
    harness.engine.pump();

    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, outcome }) => {
            assert_eq!(text, "db offline");
            assert_eq!(*outcome, Outcome::Error);
        }
        other => panic!("expected error response, got {other:?}"),
    }
    assert_eq!(harness.engine.status().kind, StatusKind::Error);
}

#[test]
fn stale_reply_is_dropped_and_current_command_still_completes() {
    let mut harness = initialized_harness();
    harness.engine.submit("report");
    let len_before = harness.engine.transcript().len();

    push_reply(&harness.transport, Some(999), "old news", ReplyStatus::Success);
    harness.engine.pump();
    assert!(harness.engine.is_busy());
    assert_eq!(harness.engine.transcript().len(), len_before);

    let id = harness.transport.last_command_id();
    push_reply(&harness.transport, id, "fresh", ReplyStatus::Success);
    harness.engine.pump();
    assert!(!harness.engine.is_busy());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, .. }) => assert_eq!(text, "fresh"),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn reply_without_id_completes_the_current_command() {
    let mut harness = initialized_harness();
    harness.engine.submit("status");
    harness.transport.push_line(
        r#"{"event":"command_response","status":"success","response":"ok"}"#,
    );
    harness.engine.pump();

    assert!(!harness.engine.is_busy());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, .. }) => assert_eq!(text, "ok"),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn unsolicited_reply_changes_nothing() {
    let mut harness = initialized_harness();
    let len_before = harness.engine.transcript().len();

    push_reply(&harness.transport, Some(7), "surprise", ReplyStatus::Success);
    harness.engine.pump();

    assert!(!harness.engine.is_busy());
    assert_eq!(harness.engine.transcript().len(), len_before);
}

#[test]
fn transport_failure_keeps_echo_and_reports_error() {
    let mut harness = initialized_harness();
    harness.transport.fail_next_send("broken pipe");

    harness.engine.submit("status");

    assert!(!harness.engine.is_busy());
    let len = harness.engine.transcript().len();
    match harness.engine.transcript().get(len - 2) {
        Some(TranscriptEntry::Command { text }) => assert_eq!(text, "status"),
        other => panic!("expected command echo, got {other:?}"),
    }
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, "Error sending command: broken pipe");
            assert_eq!(*severity, Severity::Error);
        }
        other => panic!("expected system error, got {other:?}"),
    }

    // the next attempt goes through
    complete_round_trip(&mut harness, "status", "ok");
    assert!(!harness.engine.is_busy());
}

#[test]
fn quick_commands_send_canonical_text() {
    let mut harness = initialized_harness();
    for quick in QuickCommand::ALL {
        harness.engine.quick(quick);
        let id = harness.transport.last_command_id();
        push_reply(&harness.transport, id, "ok", ReplyStatus::Success);
        harness.engine.pump();
    }

    assert_eq!(
        sent_commands(&harness.transport),
        ["list files", "memories", "viz list", "db list"]
    );
}

// ============================================================================
// Soft timeout
// ============================================================================

#[test]
fn slow_command_raises_taking_longer_notice_once() {
    let mut config = test_config();
    config.soft_timeout = Duration::ZERO;
    let mut harness = harness_with(FakeSpeechPort::new(), config);
    connect_and_init(&mut harness, FeatureFlags::all());

    harness.engine.submit("report");
    harness.engine.pump();

    assert!(harness.engine.is_busy());
    assert_eq!(harness.engine.pending_notice(), Some(PendingNotice::TakingLonger));
    assert_eq!(
        harness.engine.status().message,
        "Command is taking longer than expected..."
    );

    let id = harness.transport.last_command_id();
    push_reply(&harness.transport, id, "finally", ReplyStatus::Success);
    harness.engine.pump();
    assert!(!harness.engine.is_busy());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, .. }) => assert_eq!(text, "finally"),
        other => panic!("expected response, got {other:?}"),
    }
    assert_eq!(harness.engine.status().message, "Command completed");

    harness.engine.pump();
    assert_eq!(harness.engine.status().message, "Command completed");
}

#[test]
fn prompt_reply_beats_the_soft_timeout() {
    let mut config = test_config();
    config.soft_timeout = Duration::ZERO;
    let mut harness = harness_with(FakeSpeechPort::new(), config);
    connect_and_init(&mut harness, FeatureFlags::all());

    harness.engine.submit("status");
    let id = harness.transport.last_command_id();
    push_reply(&harness.transport, id, "All systems nominal", ReplyStatus::Success);
    harness.engine.pump();

    // the reply lands in the same pump, so the notice never fires
    assert_eq!(harness.engine.status().message, "Command completed");
    assert_eq!(harness.engine.pending_notice(), None);
}

// ============================================================================
// Voice output
// ============================================================================

#[test]
fn response_is_spoken_exactly_once_when_voice_is_enabled() {
    let mut harness = initialized_harness();
    complete_round_trip(&mut harness, "status", "All systems nominal");

    assert_eq!(speaks(&harness.speech_calls), ["All systems nominal"]);
}

#[test]
fn response_is_silent_when_voice_is_disabled() {
    let mut harness = harness();
    let features = FeatureFlags {
        enable_voice: false,
        enable_dataviz: true,
        enable_dbquery: true,
    };
    connect_and_init(&mut harness, features);
    assert!(!harness.engine.voice_enabled());

    complete_round_trip(&mut harness, "status", "All systems nominal");

    assert!(harness.speech_calls.lock().unwrap().is_empty());
}

#[test]
fn second_utterance_cancels_the_first() {
    let mut harness = initialized_harness();
    complete_round_trip(&mut harness, "first", "first reply");
    complete_round_trip(&mut harness, "second", "second reply");

    assert_eq!(speaks(&harness.speech_calls), ["first reply", "second reply"]);
    let calls = harness.speech_calls.lock().unwrap();
    let second_speak = calls
        .iter()
        .position(|call| matches!(call, SpeechCall::Speak { text, .. } if text == "second reply"))
        .unwrap();
    let first_speak = calls
        .iter()
        .position(|call| matches!(call, SpeechCall::Speak { text, .. } if text == "first reply"))
        .unwrap();
    assert!(calls[first_speak..second_speak]
        .iter()
        .any(|call| matches!(call, SpeechCall::Cancel)));
    assert!(matches!(
        calls.last(),
        Some(SpeechCall::Speak { text, .. }) if text == "second reply"
    ));
}

#[test]
fn missing_speech_capability_is_not_an_error() {
    let mut port = FakeSpeechPort::new();
    port.speak_available = false;
    let mut harness = harness_with(port, test_config());
    connect_and_init(&mut harness, FeatureFlags::all());

    complete_round_trip(&mut harness, "status", "All systems nominal");

    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, .. }) => assert_eq!(text, "All systems nominal"),
        other => panic!("expected response, got {other:?}"),
    }
    assert!(harness.speech_calls.lock().unwrap().is_empty());
    assert_eq!(harness.engine.status().kind, StatusKind::Success);
}

#[test]
fn voice_toggle_does_not_interrupt_playback() {
    let mut harness = initialized_harness();
    complete_round_trip(&mut harness, "status", "All systems nominal");
    let calls_before = harness.speech_calls.lock().unwrap().len();

    assert!(!harness.engine.toggle_voice());
    assert_eq!(harness.speech_calls.lock().unwrap().len(), calls_before);

    complete_round_trip(&mut harness, "status", "again");
    assert_eq!(speaks(&harness.speech_calls), ["All systems nominal"]);
}

// ============================================================================
// Speech recognition
// ============================================================================

#[test]
fn recognized_speech_is_submitted_as_if_typed() {
    let port = FakeSpeechPort::new();
    port.script_recognition(RecognitionResult::Transcript("list files".to_string()));
    let mut harness = harness_with(port, test_config());
    connect_and_init(&mut harness, FeatureFlags::all());

    harness.engine.start_listening();
    assert_eq!(harness.engine.status().message, "Listening...");
    harness.engine.pump();

    assert_eq!(sent_commands(&harness.transport), ["list files"]);
    assert_eq!(harness.engine.listen_state(), ListenState::Idle);
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Command { text }) => assert_eq!(text, "list files"),
        other => panic!("expected command echo, got {other:?}"),
    }
}

#[test]
fn recognition_error_updates_status_without_transcript_entry() {
    let port = FakeSpeechPort::new();
    port.script_recognition(RecognitionResult::Error("mic unavailable".to_string()));
    let mut harness = harness_with(port, test_config());
    connect_and_init(&mut harness, FeatureFlags::all());
    let len_before = harness.engine.transcript().len();

    harness.engine.start_listening();
    harness.engine.pump();

    assert_eq!(harness.engine.transcript().len(), len_before);
    assert_eq!(harness.engine.status().kind, StatusKind::Error);
    assert!(harness.engine.status().message.contains("mic unavailable"));
    assert_eq!(harness.engine.listen_state(), ListenState::Idle);
}

#[test]
fn empty_recognition_returns_to_ready() {
    let mut harness = initialized_harness();
    let len_before = harness.engine.transcript().len();

    harness.engine.start_listening();
    harness.engine.pump();

    assert_eq!(harness.engine.transcript().len(), len_before);
    assert_eq!(harness.engine.status().message, "Ready");
    assert_eq!(harness.engine.listen_state(), ListenState::Idle);
}

#[test]
fn listening_without_capability_is_refused_gently() {
    let mut port = FakeSpeechPort::new();
    port.listen_available = false;
    let mut harness = harness_with(port, test_config());
    connect_and_init(&mut harness, FeatureFlags::all());

    harness.engine.start_listening();

    assert_eq!(harness.engine.listen_state(), ListenState::Idle);
    assert_eq!(harness.engine.status().kind, StatusKind::Warning);
    assert_eq!(harness.engine.status().message, "Speech recognition is not available");
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[test]
fn banner_follows_connection_transitions() {
    let mut harness = harness();

    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();
    assert!(!harness.engine.banner_visible());
    assert_eq!(harness.engine.connection(), ConnectionStatus::Connected);
    assert_eq!(harness.engine.status().message, "Connected to backend");

    harness.transport.push_event(TransportEvent::Disconnected);
    harness.engine.pump();
    assert!(harness.engine.banner_visible());
    assert_eq!(harness.engine.connection(), ConnectionStatus::Disconnected);

    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();
    assert!(!harness.engine.banner_visible());
}

#[test]
fn dismissed_banner_stays_hidden_while_disconnected() {
    let mut harness = harness();
    harness.transport.push_event(TransportEvent::Connected);
    harness.transport.push_event(TransportEvent::Disconnected);
    harness.engine.pump();
    assert!(harness.engine.banner_visible());

    harness.engine.dismiss_banner();

    assert!(!harness.engine.banner_visible());
    assert_eq!(harness.engine.connection(), ConnectionStatus::Disconnected);
}

#[test]
fn connect_error_latches_banner() {
    let mut harness = harness();
    harness.transport.push_event(TransportEvent::ConnectError {
        message: "spawn failed".to_string(),
    });
    harness.engine.pump();

    assert!(harness.engine.banner_visible());
    assert_eq!(harness.engine.connection(), ConnectionStatus::Error);
    assert_eq!(harness.engine.status().kind, StatusKind::Error);
}

#[test]
fn disconnect_abandons_the_in_flight_command() {
    let mut harness = initialized_harness();
    harness.engine.submit("report");
    let id = harness.transport.last_command_id();
    assert!(harness.engine.is_busy());

    harness.transport.push_event(TransportEvent::Disconnected);
    harness.engine.pump();

    assert!(!harness.engine.is_busy());
    assert!(harness.engine.banner_visible());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, severity }) => {
            assert_eq!(text, "Connection lost while waiting for \"report\"");
            assert_eq!(*severity, Severity::Error);
        }
        other => panic!("expected abandon notice, got {other:?}"),
    }

    // a late reply for the abandoned command is dropped
    let len_before = harness.engine.transcript().len();
    push_reply(&harness.transport, id, "too late", ReplyStatus::Success);
    harness.engine.pump();
    assert_eq!(harness.engine.transcript().len(), len_before);
}

#[test]
fn disconnect_fails_a_pending_initialization() {
    let mut harness = harness();
    harness.transport.push_event(TransportEvent::Connected);
    harness.engine.pump();
    harness.engine.initialize(FeatureFlags::all());

    harness.transport.push_event(TransportEvent::Disconnected);
    harness.engine.pump();

    assert!(harness.engine.needs_initialization());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::System { text, .. }) => {
            assert_eq!(text, "Initialization failed: backend disconnected");
        }
        other => panic!("expected failure notice, got {other:?}"),
    }
}

// ============================================================================
// Persistence
// ============================================================================

fn file_backed_engine(dir: &PathBuf, restore: bool) -> (ConsoleEngine, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let speech = SpeechController::new(Box::new(FakeSpeechPort::new()), &speech_config());
    let storage = FileStore::new(dir.clone()).unwrap();
    let config = EngineConfig {
        greeting: GREETING.to_string(),
        soft_timeout: Duration::from_secs(15),
        restore,
    };
    let engine = ConsoleEngine::new(config, Box::new(transport.clone()), Box::new(storage), speech);
    (engine, transport)
}

#[test]
fn restore_reproduces_session_and_transcript() {
    let dir = temp_state_dir("restore");
    let _ = fs::remove_dir_all(&dir);
    {
        let (engine, transport) = file_backed_engine(&dir, true);
        let mut harness = Harness {
            engine,
            transport,
            speech_calls: Arc::new(Mutex::new(Vec::new())),
        };
        connect_and_init(&mut harness, FeatureFlags::all());
        complete_round_trip(&mut harness, "status", "All systems nominal");
        harness.engine.shutdown();
    }

    let (engine, _transport) = file_backed_engine(&dir, true);
    assert!(!engine.needs_initialization());
    assert!(engine.voice_enabled());
    let entries: Vec<_> = engine.transcript().iter().cloned().collect();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0], TranscriptEntry::system(GREETING, Severity::Info));
    assert_eq!(entries[2], TranscriptEntry::command("status"));
    assert_eq!(
        entries[3],
        TranscriptEntry::response("All systems nominal", Outcome::Success)
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn restore_from_empty_store_starts_fresh() {
    let dir = temp_state_dir("empty");
    let _ = fs::remove_dir_all(&dir);

    let (engine, _transport) = file_backed_engine(&dir, true);
    assert!(engine.needs_initialization());
    assert_eq!(engine.transcript().len(), 1);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_saved_state_falls_back_to_fresh() {
    let dir = temp_state_dir("corrupt");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("session-state.json"), "{not json").unwrap();
    fs::write(dir.join("transcript.json"), "[broken").unwrap();

    let (engine, _transport) = file_backed_engine(&dir, true);
    assert!(engine.needs_initialization());
    assert_eq!(engine.transcript().len(), 1);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn fresh_start_wipes_saved_state() {
    let dir = temp_state_dir("fresh");
    let _ = fs::remove_dir_all(&dir);
    {
        let (engine, transport) = file_backed_engine(&dir, true);
        let mut harness = Harness {
            engine,
            transport,
            speech_calls: Arc::new(Mutex::new(Vec::new())),
        };
        connect_and_init(&mut harness, FeatureFlags::all());
        harness.engine.shutdown();
    }

    {
        let (engine, _transport) = file_backed_engine(&dir, false);
        assert!(engine.needs_initialization());
        assert_eq!(engine.transcript().len(), 1);
    }

    // the wipe is durable
    let (engine, _transport) = file_backed_engine(&dir, true);
    assert!(engine.needs_initialization());
    let _ = fs::remove_dir_all(&dir);
}

struct FailingStore;

impl crate::storage::StoragePort for FailingStore {
    fn read(&self, _key: &str) -> Result<Option<String>> {
        bail!("disk on fire")
    }
    fn write(&mut self, _key: &str, _value: &str) -> Result<()> {
        bail!("disk on fire")
    }
    fn remove(&mut self, _key: &str) -> Result<()> {
        bail!("disk on fire")
    }
}

#[test]
fn storage_failures_never_interrupt_the_session() {
    let transport = ScriptedTransport::new();
    let speech = SpeechController::new(Box::new(FakeSpeechPort::new()), &speech_config());
    let engine = ConsoleEngine::new(
        test_config(),
        Box::new(transport.clone()),
        Box::new(FailingStore),
        speech,
    );
    let mut harness = Harness {
        engine,
        transport,
        speech_calls: Arc::new(Mutex::new(Vec::new())),
    };

    connect_and_init(&mut harness, FeatureFlags::all());
    complete_round_trip(&mut harness, "status", "All systems nominal");

    assert!(!harness.engine.needs_initialization());
    match harness.engine.transcript().last() {
        Some(TranscriptEntry::Response { text, .. }) => assert_eq!(text, "All systems nominal"),
        other => panic!("expected response, got {other:?}"),
    }
}

// ============================================================================
// Transcript maintenance
// ============================================================================

#[test]
fn clear_keeps_only_the_greeting() {
    let mut harness = initialized_harness();
    complete_round_trip(&mut harness, "status", "All systems nominal");
    assert!(harness.engine.transcript().len() > 1);

    harness.engine.clear();

    assert_eq!(harness.engine.transcript().len(), 1);
    match harness.engine.transcript().get(0) {
        Some(TranscriptEntry::System { text, .. }) => assert_eq!(text, GREETING),
        other => panic!("expected greeting, got {other:?}"),
    }
    assert_eq!(harness.engine.status().message, "Transcript cleared");
}

#[test]
fn quick_command_labels_are_stable() {
    let labels: Vec<_> = QuickCommand::ALL.iter().map(|quick| quick.label()).collect();
    assert_eq!(labels, ["Files", "Memories", "Visualizations", "Database"]);
}
