//! Request channel to the assistant backend.
//!
//! The production transport runs the backend as a child process speaking
//! newline-delimited JSON: commands go down stdin, events come back on
//! stdout. Connection lifecycle is reported as events so the monitor sees
//! spawn failures and exits the same way a socket client would.

use crate::log_debug;
use crate::protocol::{BackendMessage, ClientMessage};
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

/// Connection lifecycle and backend traffic, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    ConnectError { message: String },
    Message(BackendMessage),
}

/// Outbound send plus polled inbound events.
pub trait Transport: Send {
    fn send(&mut self, message: &ClientMessage) -> Result<()>;
    /// Non-blocking; `None` when nothing is pending.
    fn try_recv(&mut self) -> Option<TransportEvent>;
}

// ============================================================================
// Child process transport
// ============================================================================

pub struct ChildProcessTransport {
    label: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    events: Receiver<TransportEvent>,
    readers: Vec<JoinHandle<()>>,
}

impl ChildProcessTransport {
    /// Launch the backend. Spawn failures surface as a `ConnectError`
    /// event rather than a constructor error.
    pub fn spawn(command: &str, args: &[String]) -> Self {
        let (tx, rx) = mpsc::channel();
        let label = command.to_string();

        let spawned = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                log_debug(&format!("backend spawn failed: {label}: {err}"));
                let _ = tx.send(TransportEvent::ConnectError {
                    message: format!("failed to start {label}: {err}"),
                });
                return Self {
                    label,
                    child: None,
                    stdin: None,
                    events: rx,
                    readers: Vec::new(),
                };
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let _ = tx.send(TransportEvent::Connected);

        let mut readers = Vec::new();
        if let Some(stdout) = stdout {
            let tx = tx.clone();
            readers.push(thread::spawn(move || {
                for line in BufReader::new(stdout).lines().map_while(|line| line.ok()) {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match BackendMessage::parse_line(&line) {
                        Ok(message) => {
                            if tx.send(TransportEvent::Message(message)).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            log_debug(&format!("skipping unparseable backend line: {err}"));
                        }
                    }
                }
                let _ = tx.send(TransportEvent::Disconnected);
            }));
        }
        if let Some(stderr) = stderr {
            let label = label.clone();
            readers.push(thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(|line| line.ok()) {
                    log_debug(&format!("[{label} stderr] {line}"));
                }
            }));
        }

        Self {
            label,
            child: Some(child),
            stdin,
            events: rx,
            readers,
        }
    }
}

impl Transport for ChildProcessTransport {
    fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .with_context(|| format!("{} is not running", self.label))?;
        let json = serde_json::to_string(message).context("encoding backend message")?;
        writeln!(stdin, "{json}")
            .and_then(|_| stdin.flush())
            .with_context(|| format!("writing to {}", self.label))
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for ChildProcessTransport {
    fn drop(&mut self) {
        // Closing stdin first gives a well-behaved backend a chance to exit.
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// Scripted transport (test double)
// ============================================================================

#[cfg(any(test, feature = "mutants"))]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory transport. Clones share state so a test can hold one end
    /// while the engine owns the other.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedTransport {
        sent: Arc<Mutex<Vec<ClientMessage>>>,
        queue: Arc<Mutex<VecDeque<TransportEvent>>>,
        fail_next_send: Arc<Mutex<Option<String>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn push_event(&self, event: TransportEvent) {
            if let Ok(mut queue) = self.queue.lock() {
                queue.push_back(event);
            }
        }

        pub(crate) fn push_line(&self, line: &str) {
            let message = BackendMessage::parse_line(line).unwrap();
            self.push_event(TransportEvent::Message(message));
        }

        pub(crate) fn sent(&self) -> Vec<ClientMessage> {
            self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
        }

        pub(crate) fn sent_len(&self) -> usize {
            self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
        }

        pub(crate) fn last_command_id(&self) -> Option<u64> {
            self.sent().iter().rev().find_map(|msg| match msg {
                ClientMessage::Command { id, .. } => Some(*id),
                _ => None,
            })
        }

        pub(crate) fn fail_next_send(&self, message: &str) {
            if let Ok(mut slot) = self.fail_next_send.lock() {
                *slot = Some(message.to_string());
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, message: &ClientMessage) -> Result<()> {
            if let Ok(mut slot) = self.fail_next_send.lock() {
                if let Some(text) = slot.take() {
                    anyhow::bail!("{text}");
                }
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(message.clone());
            }
            Ok(())
        }

        fn try_recv(&mut self) -> Option<TransportEvent> {
            self.queue.lock().ok().and_then(|mut queue| queue.pop_front())
        }
    }
}
