//! Speech input and output behind a capability-checked port.
//!
//! Listening runs one recognition pass at a time on a worker thread so the
//! event loop stays responsive; speaking is fire-and-forget with at most one
//! active utterance. Capability is probed once at startup: a port without a
//! recognizer or synthesizer stays in the session as a disabled affordance,
//! never as a runtime error.

use crate::log_debug;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::borrow::Cow;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// A synthesizer voice the port can bind by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    pub locale: String,
}

/// Everything the speech subsystem needs from configuration.
#[derive(Debug, Clone, Default)]
pub struct SpeechConfig {
    pub locale: String,
    pub max_speak_chars: usize,
    pub preferred_voice: Option<String>,
    /// Recognizer argv; receives the locale as its final argument
    pub stt_command: Option<Vec<String>>,
    /// Synthesizer argv; receives the text as its final argument
    pub tts_command: Option<Vec<String>>,
    pub voices: Vec<VoiceInfo>,
}

/// One message from the recognition worker back to the controller.
#[derive(Debug, PartialEq, Eq)]
pub enum RecognitionResult {
    Transcript(String),
    Empty,
    Error(String),
}

/// Handle the controller polls for the recognition outcome.
pub struct RecognitionJob {
    pub receiver: mpsc::Receiver<RecognitionResult>,
    pub handle: Option<thread::JoinHandle<()>>,
    pub stop_flag: Arc<AtomicBool>,
}

impl RecognitionJob {
    /// Ask the worker to stop early and report what it has.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Platform speech capability as a swappable seam.
pub trait SpeechPort: Send {
    fn can_listen(&self) -> bool;
    fn can_speak(&self) -> bool;
    fn voices(&self) -> Vec<VoiceInfo>;
    fn start_recognition(&mut self, locale: &str) -> Result<RecognitionJob>;
    fn speak(&mut self, text: &str, voice: Option<&VoiceInfo>) -> Result<()>;
    fn cancel_speech(&mut self);
    fn is_speaking(&mut self) -> bool;
}

// ============================================================================
// Ports
// ============================================================================

/// Port for sessions without any speech capability. Both affordances read
/// as disabled; nothing here is an error path.
#[derive(Debug, Default)]
pub struct NullSpeechPort;

impl SpeechPort for NullSpeechPort {
    fn can_listen(&self) -> bool {
        false
    }

    fn can_speak(&self) -> bool {
        false
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn start_recognition(&mut self, _locale: &str) -> Result<RecognitionJob> {
        bail!("speech recognition is not available")
    }

    fn speak(&mut self, _text: &str, _voice: Option<&VoiceInfo>) -> Result<()> {
        bail!("speech synthesis is not available")
    }

    fn cancel_speech(&mut self) {}

    fn is_speaking(&mut self) -> bool {
        false
    }
}

/// Port backed by external helper commands.
///
/// The recognizer must print one transcript on stdout and exit; the
/// synthesizer must accept the text as its final argument and, when a
/// voice is bound, a `-v NAME` pair before it.
pub struct ProcessSpeechPort {
    stt_command: Option<Vec<String>>,
    tts_command: Option<Vec<String>>,
    voices: Vec<VoiceInfo>,
    utterance: Option<Child>,
}

impl ProcessSpeechPort {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            stt_command: config.stt_command.clone(),
            tts_command: config.tts_command.clone(),
            voices: config.voices.clone(),
            utterance: None,
        }
    }
}

impl SpeechPort for ProcessSpeechPort {
    fn can_listen(&self) -> bool {
        self.stt_command.is_some()
    }

    fn can_speak(&self) -> bool {
        self.tts_command.is_some()
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    fn start_recognition(&mut self, locale: &str) -> Result<RecognitionJob> {
        let argv = self
            .stt_command
            .clone()
            .context("no recognizer command configured")?;
        let locale = locale.to_string();
        let (tx, rx) = mpsc::sync_channel(1);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_worker = stop_flag.clone();

        let handle = thread::spawn(move || {
            let message = run_recognition(&argv, &locale, &stop_flag_worker);
            let _ = tx.send(message);
        });

        Ok(RecognitionJob {
            receiver: rx,
            handle: Some(handle),
            stop_flag,
        })
    }

    fn speak(&mut self, text: &str, voice: Option<&VoiceInfo>) -> Result<()> {
        let argv = self
            .tts_command
            .clone()
            .context("no synthesizer command configured")?;
        self.cancel_speech();

        let (program, args) = argv
            .split_first()
            .context("synthesizer command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(voice) = voice {
            cmd.args(["-v", &voice.name]);
        }
        cmd.arg(text);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start synthesizer {program}"))?;
        self.utterance = Some(child);
        Ok(())
    }

    fn cancel_speech(&mut self) {
        if let Some(mut child) = self.utterance.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn is_speaking(&mut self) -> bool {
        match self.utterance.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(_)) => {
                    self.utterance = None;
                    false
                }
                Ok(None) => true,
                Err(_) => {
                    self.utterance = None;
                    false
                }
            },
            None => false,
        }
    }
}

/// Run one recognizer pass, honoring the early-stop flag while it runs.
fn run_recognition(argv: &[String], locale: &str, stop_flag: &AtomicBool) -> RecognitionResult {
    let Some((program, args)) = argv.split_first() else {
        return RecognitionResult::Error("recognizer command is empty".to_string());
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.arg(locale);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return RecognitionResult::Error(format!("failed to start recognizer {program}: {err}"))
        }
    };
    let mut stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => return RecognitionResult::Error("recognizer stdout unavailable".to_string()),
    };
    let mut stderr = child.stderr.take();

    let status = loop {
        if stop_flag.load(Ordering::Relaxed) {
            let _ = child.kill();
            let _ = child.wait();
            log_debug("recognition stopped early by request");
            return RecognitionResult::Empty;
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(Duration::from_millis(50)),
            Err(err) => return RecognitionResult::Error(format!("recognizer wait failed: {err}")),
        }
    };

    let mut out = Vec::new();
    let _ = stdout.read_to_end(&mut out);
    if !status.success() {
        let mut err = Vec::new();
        if let Some(stderr) = stderr.as_mut() {
            let _ = stderr.read_to_end(&mut err);
        }
        let detail = String::from_utf8_lossy(&err);
        return RecognitionResult::Error(format!(
            "recognizer exited with {status}: {}",
            detail.trim()
        ));
    }

    let transcript = normalize_transcript(&String::from_utf8_lossy(&out));
    if transcript.is_empty() {
        RecognitionResult::Empty
    } else {
        RecognitionResult::Transcript(transcript)
    }
}

/// Collapse runs of whitespace so recognizer output submits cleanly.
fn normalize_transcript(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Voice selection and truncation
// ============================================================================

/// Bind a preferred voice by name: exact match first, then a whole-word
/// match, then a plain substring match. All case-insensitive.
pub fn choose_voice<'a>(voices: &'a [VoiceInfo], preferred: &str) -> Option<&'a VoiceInfo> {
    let preferred = preferred.trim();
    if preferred.is_empty() {
        return None;
    }
    if let Some(voice) = voices
        .iter()
        .find(|voice| voice.name.eq_ignore_ascii_case(preferred))
    {
        return Some(voice);
    }
    if let Ok(word_re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(preferred))) {
        if let Some(voice) = voices.iter().find(|voice| word_re.is_match(&voice.name)) {
            return Some(voice);
        }
    }
    let lowered = preferred.to_lowercase();
    voices
        .iter()
        .find(|voice| voice.name.to_lowercase().contains(&lowered))
}

/// Cap utterance length, marking the cut with an ellipsis.
pub fn truncate_for_speech(text: &str, max_chars: usize) -> Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }
    let keep = max_chars.saturating_sub(3);
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str("...");
    Cow::Owned(truncated)
}

// ============================================================================
// Controller
// ============================================================================

/// Listening channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    Idle,
    Listening,
}

/// Drives both speech channels against whatever port the session got.
pub struct SpeechController {
    port: Box<dyn SpeechPort>,
    locale: String,
    max_speak_chars: usize,
    preferred_voice: Option<String>,
    listening: Option<RecognitionJob>,
}

impl SpeechController {
    pub fn new(port: Box<dyn SpeechPort>, config: &SpeechConfig) -> Self {
        Self {
            port,
            locale: config.locale.clone(),
            max_speak_chars: config.max_speak_chars,
            preferred_voice: config.preferred_voice.clone(),
            listening: None,
        }
    }

    pub fn can_listen(&self) -> bool {
        self.port.can_listen()
    }

    pub fn can_speak(&self) -> bool {
        self.port.can_speak()
    }

    pub fn listen_state(&self) -> ListenState {
        if self.listening.is_some() {
            ListenState::Listening
        } else {
            ListenState::Idle
        }
    }

    /// Kick off one recognition pass. `Ok(false)` means one is already
    /// running; the caller treats that as a no-op.
    pub fn start_listening(&mut self) -> Result<bool> {
        if !self.port.can_listen() {
            bail!("speech recognition is not available");
        }
        if self.listening.is_some() {
            return Ok(false);
        }
        let job = self.port.start_recognition(&self.locale)?;
        self.listening = Some(job);
        Ok(true)
    }

    /// Idempotent; asks a running pass to wrap up early.
    pub fn stop_listening(&mut self) {
        if let Some(job) = &self.listening {
            job.request_stop();
        }
    }

    /// Non-blocking poll of the recognition worker. Returns the outcome
    /// once, after which the channel is idle again.
    pub fn poll_recognition(&mut self) -> Option<RecognitionResult> {
        let job = self.listening.as_mut()?;
        let result = match job.receiver.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => {
                RecognitionResult::Error("recognition worker disconnected".to_string())
            }
        };
        let mut job = match self.listening.take() {
            Some(job) => job,
            None => return Some(result),
        };
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        Some(result)
    }

    /// Cancel any current utterance, then start speaking `text`.
    pub fn speak(&mut self, text: &str) -> Result<()> {
        if !self.port.can_speak() {
            bail!("speech synthesis is not available");
        }
        self.port.cancel_speech();
        let spoken = truncate_for_speech(text, self.max_speak_chars);
        let voices = self.port.voices();
        let voice = self
            .preferred_voice
            .as_deref()
            .and_then(|preferred| choose_voice(&voices, preferred));
        self.port.speak(&spoken, voice)
    }

    /// Unconditional cancel; safe when nothing is playing.
    pub fn stop_speech(&mut self) {
        self.port.cancel_speech();
    }

    pub fn is_speaking(&mut self) -> bool {
        self.port.is_speaking()
    }
}

// ============================================================================
// Fake port (test double)
// ============================================================================

#[cfg(any(test, feature = "mutants"))]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum SpeechCall {
        Speak { text: String, voice: Option<String> },
        Cancel,
    }

    /// Records every port call; recognition results are scripted up front.
    pub(crate) struct FakeSpeechPort {
        pub(crate) calls: Arc<Mutex<Vec<SpeechCall>>>,
        pub(crate) voices: Vec<VoiceInfo>,
        pub(crate) listen_available: bool,
        pub(crate) speak_available: bool,
        scripted: Arc<Mutex<VecDeque<RecognitionResult>>>,
    }

    impl FakeSpeechPort {
        pub(crate) fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                voices: Vec::new(),
                listen_available: true,
                speak_available: true,
                scripted: Arc::new(Mutex::new(VecDeque::new())),
            }
        }

        pub(crate) fn calls_handle(&self) -> Arc<Mutex<Vec<SpeechCall>>> {
            self.calls.clone()
        }

        pub(crate) fn script_recognition(&self, result: RecognitionResult) {
            if let Ok(mut scripted) = self.scripted.lock() {
                scripted.push_back(result);
            }
        }
    }

    impl SpeechPort for FakeSpeechPort {
        fn can_listen(&self) -> bool {
            self.listen_available
        }

        fn can_speak(&self) -> bool {
            self.speak_available
        }

        fn voices(&self) -> Vec<VoiceInfo> {
            self.voices.clone()
        }

        fn start_recognition(&mut self, _locale: &str) -> Result<RecognitionJob> {
            let (tx, rx) = mpsc::sync_channel(1);
            let result = self
                .scripted
                .lock()
                .ok()
                .and_then(|mut scripted| scripted.pop_front())
                .unwrap_or(RecognitionResult::Empty);
            tx.send(result).expect("scripted channel has capacity");
            Ok(RecognitionJob {
                receiver: rx,
                handle: None,
                stop_flag: Arc::new(AtomicBool::new(false)),
            })
        }

        fn speak(&mut self, text: &str, voice: Option<&VoiceInfo>) -> Result<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(SpeechCall::Speak {
                    text: text.to_string(),
                    voice: voice.map(|voice| voice.name.clone()),
                });
            }
            Ok(())
        }

        fn cancel_speech(&mut self) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(SpeechCall::Cancel);
            }
        }

        fn is_speaking(&mut self) -> bool {
            self.calls
                .lock()
                .map(|calls| matches!(calls.last(), Some(SpeechCall::Speak { .. })))
                .unwrap_or(false)
        }
    }
}
