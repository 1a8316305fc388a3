//! One-at-a-time command dispatch with request correlation.
//!
//! The dispatcher owns the in-flight slot: a command occupies it from send
//! until its correlated reply lands, and nothing else may dispatch in
//! between. A soft deadline produces a single advisory notice for slow
//! replies; it never cancels the command.

use crate::protocol::ClientMessage;
use crate::session::SessionState;
use crate::transport::Transport;
use std::time::{Duration, Instant};

pub const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(15);

/// Why a submission was refused. Matched where the message is rendered.
#[derive(Debug)]
pub enum SubmitError {
    EmptyCommand,
    NotInitialized,
    CommandInFlight,
    Transport(String),
}

/// The command currently occupying the dispatch slot.
#[derive(Debug)]
pub struct InFlight {
    request_id: u64,
    command: String,
    submitted_at: Instant,
    soft_deadline: Instant,
    slow_notice_sent: bool,
}

impl InFlight {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }

    pub fn slow_notice_sent(&self) -> bool {
        self.slow_notice_sent
    }
}

/// A completed round trip, handed back when the matching reply arrives.
#[derive(Debug)]
pub struct Completed {
    pub request_id: u64,
    pub command: String,
    pub elapsed: Duration,
}

/// How an incoming reply relates to the in-flight slot.
#[derive(Debug)]
pub enum ReplyMatch {
    /// Reply for the current command; the slot is free again
    Completed(Completed),
    /// Correlated to a request that is no longer waiting
    Stale { reply_id: u64 },
    /// Nothing was in flight
    Unsolicited,
}

#[derive(Debug)]
pub struct Dispatcher {
    soft_timeout: Duration,
    next_request_id: u64,
    in_flight: Option<InFlight>,
}

impl Dispatcher {
    pub fn new(soft_timeout: Duration) -> Self {
        Self {
            soft_timeout,
            next_request_id: 1,
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    /// Validate, send, and occupy the slot. The command text is trimmed
    /// before any check so whitespace never dispatches.
    pub fn submit(
        &mut self,
        text: &str,
        session: &SessionState,
        transport: &mut dyn Transport,
    ) -> Result<u64, SubmitError> {
        let command = text.trim();
        if command.is_empty() {
            return Err(SubmitError::EmptyCommand);
        }
        if !session.is_initialized() {
            return Err(SubmitError::NotInitialized);
        }
        if self.in_flight.is_some() {
            return Err(SubmitError::CommandInFlight);
        }

        let request_id = self.next_request_id;
        transport
            .send(&ClientMessage::Command {
                id: request_id,
                command: command.to_string(),
            })
            .map_err(|err| SubmitError::Transport(format!("{err:#}")))?;

        self.next_request_id += 1;
        let submitted_at = Instant::now();
        self.in_flight = Some(InFlight {
            request_id,
            command: command.to_string(),
            submitted_at,
            soft_deadline: submitted_at + self.soft_timeout,
            slow_notice_sent: false,
        });
        Ok(request_id)
    }

    /// One-shot slow notice once the soft deadline passes. Returns the
    /// waiting command the first time it fires, `None` afterwards.
    pub fn poll_slow_notice(&mut self, now: Instant) -> Option<&InFlight> {
        let in_flight = self.in_flight.as_mut()?;
        if in_flight.slow_notice_sent || now < in_flight.soft_deadline {
            return None;
        }
        in_flight.slow_notice_sent = true;
        Some(&*in_flight)
    }

    /// Match a reply against the slot. Only a matching id (or an id-less
    /// reply from an older backend) completes the in-flight command.
    pub fn accept_reply(&mut self, reply_id: Option<u64>) -> ReplyMatch {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return ReplyMatch::Unsolicited;
        };
        if let Some(reply_id) = reply_id {
            if reply_id != in_flight.request_id {
                return ReplyMatch::Stale { reply_id };
            }
        }
        let Some(in_flight) = self.in_flight.take() else {
            return ReplyMatch::Unsolicited;
        };
        let elapsed = in_flight.elapsed(Instant::now());
        ReplyMatch::Completed(Completed {
            request_id: in_flight.request_id,
            command: in_flight.command,
            elapsed,
        })
    }

    /// Drop the in-flight command without completing it. Used when the
    /// connection is gone and no reply can arrive anymore.
    pub fn abandon(&mut self) -> Option<Completed> {
        let in_flight = self.in_flight.take()?;
        let elapsed = in_flight.elapsed(Instant::now());
        Some(Completed {
            request_id: in_flight.request_id,
            command: in_flight.command,
            elapsed,
        })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_TIMEOUT)
    }
}
