//! Environment diagnostics behind `--doctor`.
//!
//! Collects everything a bug report needs into one printable block:
//! resolved commands, capability probes, and where the logs live.

use crate::config::AppConfig;
use crate::logging::{crash_log_path, log_file_path};
use std::env;
use std::fmt::Display;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub struct DoctorReport {
    title: String,
    lines: Vec<ReportLine>,
}

enum ReportLine {
    Section(String),
    KeyValue(String, String),
}

impl DoctorReport {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn section(&mut self, name: &str) {
        self.lines.push(ReportLine::Section(name.to_string()));
    }

    pub fn push_kv(&mut self, key: &str, value: impl Display) {
        self.lines
            .push(ReportLine::KeyValue(key.to_string(), value.to_string()));
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} doctor", self.title);
        for line in &self.lines {
            match line {
                ReportLine::Section(name) => {
                    let _ = writeln!(out, "\n[{name}]");
                }
                ReportLine::KeyValue(key, value) => {
                    let _ = writeln!(out, "  {key}: {value}");
                }
            }
        }
        out
    }
}

/// Shared sections every invocation wants; callers append their own.
pub fn base_doctor_report(config: &AppConfig, app_name: &str) -> DoctorReport {
    let mut report = DoctorReport::new(app_name);

    report.section("Build");
    report.push_kv("version", env!("CARGO_PKG_VERSION"));
    report.push_kv("os", env::consts::OS);

    report.section("Backend");
    report.push_kv("command", &config.backend_cmd);
    report.push_kv("args", config.backend_args.join(" "));
    report.push_kv(
        "resolved",
        describe_lookup(&config.backend_cmd),
    );

    report.section("Speech");
    report.push_kv(
        "recognizer",
        config.stt_cmd.as_deref().unwrap_or("not configured"),
    );
    report.push_kv(
        "synthesizer",
        config.tts_cmd.as_deref().unwrap_or("not configured"),
    );
    report.push_kv("locale", &config.locale);
    report.push_kv(
        "preferred_voice",
        config.preferred_voice.as_deref().unwrap_or("default"),
    );

    report.section("Session");
    report.push_kv("features", config.feature_flags().summary());
    report.push_kv("soft_timeout_secs", config.soft_timeout_secs);
    report.push_kv(
        "state_dir",
        if config.no_persist {
            "disabled (--no-persist)".to_string()
        } else {
            config.resolved_state_dir().display().to_string()
        },
    );

    report.section("Logs");
    report.push_kv("debug_log", log_file_path().display());
    report.push_kv("crash_log", crash_log_path().display());

    report
}

fn describe_lookup(command: &str) -> String {
    if Path::new(command).is_absolute() {
        return command.to_string();
    }
    match find_in_path(command) {
        Some(path) => path.display().to_string(),
        None => "not found on PATH".to_string(),
    }
}

/// Walk PATH the way the shell would.
pub fn find_in_path(command: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(command);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    true
}
