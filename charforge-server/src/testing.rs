//! In-process stand-ins for the generation backend and the gateway.
//!
//! Used by the unit tests and by `tests/`; also handy for running the
//! server against the memory backend without network access.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use charforge_core::{Delivery, GenerationError, Notifier, NotifyError, TextGenerationClient, Turn};

/// Returns queued results in order, then a fixed reply once the queue is
/// empty. Records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: Mutex<Vec<(String, Vec<Turn>)>>,
}

impl ScriptedGenerator {
    pub const DEFAULT_REPLY: &'static str = "ok";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, reply: &str) {
        lock(&self.queue).push_back(Ok(reply.to_string()));
    }

    pub fn push_err(&self, error: GenerationError) {
        lock(&self.queue).push_back(Err(error));
    }

    /// `(system_instruction, transcript)` for every call so far.
    pub fn calls(&self) -> Vec<(String, Vec<Turn>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TextGenerationClient for ScriptedGenerator {
    async fn generate(
        &self,
        system_instruction: &str,
        transcript: &[Turn],
    ) -> Result<String, GenerationError> {
        lock(&self.calls).push((system_instruction.to_string(), transcript.to_vec()));
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::DEFAULT_REPLY.to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Deliver,
    Unreachable,
    /// Transient gateway failure.
    Fail,
}

/// Records delivered messages; the outcome can be switched at any time.
#[derive(Debug)]
pub struct RecordingNotifier {
    outcome: Mutex<NotifyOutcome>,
    sent: Mutex<Vec<(String, String)>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(NotifyOutcome::Deliver),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_outcome(&self, outcome: NotifyOutcome) {
        *lock(&self.outcome) = outcome;
    }

    /// `(owner, text)` of every delivered message.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, owner: &str, text: &str) -> Result<Delivery, NotifyError> {
        let outcome = *lock(&self.outcome);
        match outcome {
            NotifyOutcome::Deliver => {
                lock(&self.sent).push((owner.to_string(), text.to_string()));
                Ok(Delivery::Delivered)
            }
            NotifyOutcome::Unreachable => Ok(Delivery::Unreachable),
            NotifyOutcome::Fail => Err(NotifyError::Gateway {
                code: 503,
                message: "gateway unavailable".to_string(),
            }),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
