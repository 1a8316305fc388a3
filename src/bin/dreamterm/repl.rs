//! The read-eval-print loop: stdin lines in, engine output out.
//!
//! Stdin is read on its own thread because `BufRead::lines` blocks; the
//! main loop multiplexes typed lines with a pump tick so backend replies
//! and recognition results surface while the prompt is idle.

use crate::commands::{self, Action};
use crate::render::{self, Palette};
use anyhow::Result;
use crossbeam_channel::{bounded, select, Sender};
use dreamterm::config::AppConfig;
use dreamterm::engine::ConsoleEngine;
use dreamterm::log_debug;
use dreamterm::protocol::FeatureFlags;
use dreamterm::speech::ListenState;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

/// Max pending input lines before the reader thread blocks.
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Engine pump cadence while waiting for input.
const TICK_INTERVAL: Duration = Duration::from_millis(25);

enum InputEvent {
    Line(String),
    Eof,
}

pub(crate) fn run(mut engine: ConsoleEngine, config: &AppConfig) -> Result<()> {
    let features = config.feature_flags();
    let mut state = RenderState::new(Palette::detect());
    let mut out = io::stdout();

    let (input_tx, input_rx) = bounded(INPUT_CHANNEL_CAPACITY);
    spawn_stdin_thread(input_tx);

    engine.pump();
    flush_output(&mut engine, &mut state, &mut out)?;
    prompt(&engine, &mut out)?;

    loop {
        let mut typed = false;
        select! {
            recv(input_rx) -> event => match event {
                Ok(InputEvent::Line(line)) => {
                    typed = true;
                    match commands::parse(&line) {
                        Action::Quit => break,
                        action => apply(&mut engine, action, features, state.palette, &mut out)?,
                    }
                }
                Ok(InputEvent::Eof) | Err(_) => break,
            },
            default(TICK_INTERVAL) => {}
        }
        engine.pump();
        let printed = flush_output(&mut engine, &mut state, &mut out)?;
        if typed || printed {
            prompt(&engine, &mut out)?;
        }
    }

    engine.shutdown();
    writeln!(out)?;
    Ok(())
}

fn apply(
    engine: &mut ConsoleEngine,
    action: Action,
    features: FeatureFlags,
    palette: Palette,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        Action::Submit(text) => engine.submit(&text),
        Action::Initialize(chosen) => {
            if engine.needs_initialization() {
                engine.initialize(chosen.unwrap_or(features));
            } else {
                writeln!(
                    out,
                    "{}",
                    render::notice_line(palette, "session is already initialized")
                )?;
            }
        }
        Action::Clear => engine.clear(),
        Action::VoiceOn => engine.set_voice(true),
        Action::VoiceOff => engine.set_voice(false),
        Action::Listen => engine.start_listening(),
        Action::StopListening => engine.stop_listening(),
        Action::Silence => engine.stop_speech(),
        Action::Quick(quick) => engine.quick(quick),
        Action::Status => print_session_summary(engine, out)?,
        Action::DismissBanner => engine.dismiss_banner(),
        Action::Nothing => {}
        Action::Invalid(message) => {
            writeln!(out, "{}", render::notice_line(palette, &message))?;
        }
        Action::Quit => {}
    }
    Ok(())
}

fn print_session_summary(engine: &ConsoleEngine, out: &mut impl Write) -> io::Result<()> {
    let mic = match engine.listen_state() {
        ListenState::Idle => "idle",
        ListenState::Listening => "listening",
    };
    writeln!(
        out,
        "connection={} initialized={} voice={} mic={} can_listen={} can_speak={}",
        engine.connection().label(),
        if engine.needs_initialization() { "no" } else { "yes" },
        if engine.voice_enabled() { "on" } else { "off" },
        mic,
        engine.can_listen(),
        engine.can_speak(),
    )
}

fn prompt(engine: &ConsoleEngine, out: &mut impl Write) -> io::Result<()> {
    let listening = engine.listen_state() == ListenState::Listening;
    write!(out, "{}", render::prompt_label(engine.is_busy(), listening))?;
    out.flush()
}

struct RenderState {
    palette: Palette,
    printed_entries: usize,
    last_status: Option<String>,
    banner_was_visible: bool,
}

impl RenderState {
    fn new(palette: Palette) -> Self {
        Self {
            palette,
            printed_entries: 0,
            last_status: None,
            banner_was_visible: false,
        }
    }
}

/// Print whatever changed since the last flush. Returns true when any
/// line went out.
fn flush_output(
    engine: &mut ConsoleEngine,
    state: &mut RenderState,
    out: &mut impl Write,
) -> io::Result<bool> {
    if !engine.take_redraw_request() {
        return Ok(false);
    }
    let mut printed = false;

    // /clear shrinks the transcript; follow it back down
    if state.printed_entries > engine.transcript().len() {
        state.printed_entries = engine.transcript().len();
    }
    while let Some(entry) = engine.transcript().get(state.printed_entries) {
        writeln!(out, "{}", render::entry_line(state.palette, entry))?;
        state.printed_entries += 1;
        printed = true;
    }

    let status = engine.status();
    let status_key = format!("{:?}:{}", status.kind, status.message);
    if state.last_status.as_deref() != Some(status_key.as_str()) {
        writeln!(out, "{}", render::status_line(state.palette, status))?;
        state.last_status = Some(status_key);
        printed = true;
    }

    let banner_visible = engine.banner_visible();
    if banner_visible && !state.banner_was_visible {
        writeln!(out, "{}", render::banner_line(state.palette, engine.connection()))?;
        printed = true;
    }
    state.banner_was_visible = banner_visible;

    out.flush()?;
    Ok(printed)
}

fn spawn_stdin_thread(tx: Sender<InputEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(InputEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    log_debug(&format!("stdin read failed: {err}"));
                    break;
                }
            }
        }
        let _ = tx.send(InputEvent::Eof);
    });
}
