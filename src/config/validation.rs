use super::defaults::{
    FORBIDDEN_VALUE_CHARS, ISO_639_1_CODES, MAX_BACKEND_ARGS, MAX_BACKEND_ARG_BYTES,
    MAX_SOFT_TIMEOUT_SECS, MAX_SPEECH_MAX_CHARS, MAX_VOICE_NAME_CHARS, MIN_SOFT_TIMEOUT_SECS,
    MIN_SPEECH_MAX_CHARS,
};
use super::AppConfig;
use crate::protocol::FeatureFlags;
use crate::speech::VoiceInfo;
use anyhow::{anyhow, bail, Context, Result};
use std::{fs, path::Path};

impl AppConfig {
    /// Check CLI values and normalize command paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_SOFT_TIMEOUT_SECS..=MAX_SOFT_TIMEOUT_SECS).contains(&self.soft_timeout_secs) {
            bail!(
                "--soft-timeout-secs must be between {MIN_SOFT_TIMEOUT_SECS} and {MAX_SOFT_TIMEOUT_SECS}, got {}",
                self.soft_timeout_secs
            );
        }
        if !(MIN_SPEECH_MAX_CHARS..=MAX_SPEECH_MAX_CHARS).contains(&self.speech_max_chars) {
            bail!(
                "--speech-max-chars must be between {MIN_SPEECH_MAX_CHARS} and {MAX_SPEECH_MAX_CHARS}, got {}",
                self.speech_max_chars
            );
        }

        if self.locale.trim().is_empty() {
            bail!("--locale must not be empty");
        }
        if !self
            .locale
            .chars()
            .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
        {
            bail!("--locale must contain only alphabetic characters or '-'/'_' separators");
        }
        // Allow locale-style values but only check the leading ISO-639-1 code.
        let locale_primary = self
            .locale
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if !ISO_639_1_CODES.contains(&locale_primary.as_str()) {
            bail!(
                "--locale must start with a valid ISO-639-1 code, got '{}'",
                self.locale
            );
        }

        if let Some(voice) = &self.preferred_voice {
            check_passthrough_value(voice, "--preferred-voice")?;
        }

        parse_feature_list(&self.features)
            .with_context(|| format!("invalid --features '{}'", self.features))?;

        self.backend_cmd = sanitize_command(&self.backend_cmd, "--backend-cmd")?;

        // Avoid huge argument lists when spawning the backend.
        if self.backend_args.len() > MAX_BACKEND_ARGS {
            bail!(
                "--backend-arg repeated too many times (max {MAX_BACKEND_ARGS}, got {})",
                self.backend_args.len()
            );
        }
        let total_arg_bytes: usize = self.backend_args.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_BACKEND_ARG_BYTES {
            bail!("combined --backend-arg length exceeds {MAX_BACKEND_ARG_BYTES} bytes");
        }

        if let Some(raw) = self.stt_cmd.take() {
            self.stt_cmd = Some(normalize_helper_command(&raw, "--stt-cmd")?);
        }
        if let Some(raw) = self.tts_cmd.take() {
            self.tts_cmd = Some(normalize_helper_command(&raw, "--tts-cmd")?);
        }
        if let Some(raw) = &self.tts_voices {
            parse_voice_list(raw, &self.locale)?;
        }

        if let Some(dir) = &self.state_dir {
            if dir.exists() && !dir.is_dir() {
                bail!("--state-dir '{}' exists but is not a directory", dir.display());
            }
        }

        Ok(())
    }
}

/// Turn `--features` into flags. Accepts `none` or an empty list for an
/// all-off request.
pub fn parse_feature_list(raw: &str) -> Result<FeatureFlags> {
    let mut flags = FeatureFlags::default();
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(flags);
    }
    for part in trimmed.split(',') {
        match part.trim().to_ascii_lowercase().as_str() {
            "voice" => flags.enable_voice = true,
            "dataviz" => flags.enable_dataviz = true,
            "dbquery" => flags.enable_dbquery = true,
            "" => {}
            other => bail!("unknown feature '{other}' (expected voice, dataviz, dbquery)"),
        }
    }
    Ok(flags)
}

/// Parse a `NAME[:LOCALE]` comma list into voice descriptors.
pub(super) fn parse_voice_list(raw: &str, default_locale: &str) -> Result<Vec<VoiceInfo>> {
    let mut voices = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, locale) = match part.split_once(':') {
            Some((name, locale)) => (name.trim(), locale.trim()),
            None => (part, default_locale),
        };
        if name.is_empty() || locale.is_empty() {
            bail!("--tts-voices entry '{part}' must look like NAME or NAME:LOCALE");
        }
        check_passthrough_value(name, "--tts-voices")?;
        voices.push(VoiceInfo {
            name: name.to_string(),
            locale: locale.to_string(),
        });
    }
    if voices.is_empty() {
        bail!("--tts-voices lists no voices");
    }
    Ok(voices)
}

/// Split a helper command line, vet its executable, and put it back
/// together with the canonicalized head.
fn normalize_helper_command(raw: &str, flag: &str) -> Result<String> {
    let argv = split_command(raw, flag)?;
    let head = sanitize_command(&argv[0], flag)?;
    let mut rebuilt = vec![head];
    rebuilt.extend(argv[1..].iter().cloned());
    Ok(shell_words::join(&rebuilt))
}

pub(super) fn split_command(raw: &str, flag: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(raw)
        .with_context(|| format!("{flag} could not be parsed as a command line"))?;
    if argv.is_empty() {
        bail!("{flag} cannot be empty");
    }
    Ok(argv)
}

/// Allow either a plain executable name or an existing executable path.
pub(super) fn sanitize_command(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        bail!("{flag} '{trimmed}' must be a plain executable name or a path to one");
    }
    Ok(trimmed.to_string())
}

/// Values handed to subprocess argv stay short and free of shell
/// metacharacters.
fn check_passthrough_value(value: &str, flag: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{flag} cannot be empty");
    }
    if value.chars().count() > MAX_VOICE_NAME_CHARS {
        bail!("{flag} must be at most {MAX_VOICE_NAME_CHARS} characters");
    }
    if value.chars().any(|ch| FORBIDDEN_VALUE_CHARS.contains(&ch)) {
        bail!("{flag} contains a forbidden character");
    }
    Ok(())
}
