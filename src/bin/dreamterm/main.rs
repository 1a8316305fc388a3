//! DreamTerm entrypoint: a line console for a DreamOS backend.
//!
//! The backend runs as a child process speaking newline-delimited JSON.
//! One session engine owns all state; the loop in `repl` feeds it typed
//! lines and drains backend traffic between reads.
//!
//! # Architecture
//!
//! - stdin thread: reads lines, forwards them over a bounded channel
//! - engine: transcript, session state, dispatch, speech, persistence
//! - backend child: spawned once; its exit ends command processing

mod commands;
mod render;
mod repl;

use anyhow::Result;
use clap::Parser;
use dreamterm::config::AppConfig;
use dreamterm::doctor::base_doctor_report;
use dreamterm::engine::{ConsoleEngine, EngineConfig, QuickCommand};
use dreamterm::speech::{NullSpeechPort, ProcessSpeechPort, SpeechController, SpeechPort};
use dreamterm::storage::{FileStore, MemoryStore, StoragePort};
use dreamterm::transport::ChildProcessTransport;
use dreamterm::{init_logging, log_debug, log_file_path, log_panic};
use std::panic;

fn main() -> Result<()> {
    let mut config = AppConfig::parse();

    if config.doctor {
        let mut report = base_doctor_report(&config, "dreamterm");
        report.section("Quick commands");
        for quick in QuickCommand::ALL {
            report.push_kv(quick.label(), quick.command_text());
        }
        println!("{}", report.render());
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    log_debug("=== DreamTerm Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    install_panic_hook();

    let speech_config = config.speech_config();
    let has_helpers = speech_config.stt_command.is_some() || speech_config.tts_command.is_some();
    let speech_port: Box<dyn SpeechPort> = if has_helpers {
        Box::new(ProcessSpeechPort::from_config(&speech_config))
    } else {
        log_debug("no speech helpers configured; voice features disabled");
        Box::new(NullSpeechPort)
    };
    let speech = SpeechController::new(speech_port, &speech_config);

    let storage: Box<dyn StoragePort> = if config.no_persist {
        Box::new(MemoryStore::new())
    } else {
        Box::new(FileStore::new(config.resolved_state_dir())?)
    };

    let transport = ChildProcessTransport::spawn(&config.backend_cmd, &config.backend_args);
    let engine = ConsoleEngine::new(
        EngineConfig::from_app(&config),
        Box::new(transport),
        storage,
        speech,
    );

    repl::run(engine, &config)?;

    log_debug("=== DreamTerm Exiting ===");
    Ok(())
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous(info);
    }));
}
