//! In-process transport for tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{SendOutcome, Transport, TransportError};

/// One recorded call to [`MockTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// `None` when the call ended in a fault
    pub outcome: Option<SendOutcome>,
}

#[derive(Debug, Clone)]
enum Script {
    Reject(String),
    Fault(String),
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<SentMessage>,
    scripts: HashMap<String, Script>,
}

/// Records every send; accepts everything unless told otherwise.
///
/// Clones share state, so a test can hand one clone to the executor and
/// inspect the other.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
    configured: Arc<AtomicBool>,
    template_free: bool,
    delay: Option<Duration>,
    notify: Arc<Notify>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            configured: Arc::new(AtomicBool::new(true)),
            template_free: true,
            delay: None,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Sleep this long inside every send.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Behave like a templating provider.
    #[must_use]
    pub const fn templated(mut self) -> Self {
        self.template_free = false;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse mail for `email` with a 550.
    pub fn reject(&self, email: &str, reason: &str) {
        self.state()
            .scripts
            .insert(email.to_string(), Script::Reject(reason.to_string()));
    }

    /// Fail sends to `email` with a connection fault.
    pub fn fail(&self, email: &str) {
        self.state().scripts.insert(
            email.to_string(),
            Script::Fault(format!("connection to relay reset while sending to {email}")),
        );
    }

    /// Remove any script for `email`.
    pub fn heal(&self, email: &str) {
        self.state().scripts.remove(email);
    }

    pub fn set_configured(&self, configured: bool) {
        self.configured
            .store(configured, Ordering::SeqCst);
    }

    /// Every call in the order it was made.
    pub fn calls(&self) -> Vec<SentMessage> {
        self.state().calls.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state().calls.len()
    }

    /// Recipients whose messages were accepted.
    pub fn accepted(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call.outcome, Some(SendOutcome::Accepted)))
            .map(|call| call.to.clone())
            .collect()
    }

    /// How many times `email` was attempted.
    pub fn attempts_for(&self, email: &str) -> usize {
        self.state().calls.iter().filter(|c| c.to == email).count()
    }

    /// Wait until at least `expected` sends were attempted.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_attempts(&self, expected: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.attempts() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn template_free(&self) -> bool {
        self.template_free
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendOutcome, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.state().scripts.get(to).cloned();
        let result = match script {
            None => Ok(SendOutcome::Accepted),
            Some(Script::Reject(reason)) => Ok(SendOutcome::rejected(Some(550), reason)),
            Some(Script::Fault(reason)) => Err(TransportError::Connection(reason)),
        };

        self.state().calls.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            outcome: result.as_ref().ok().cloned(),
        });
        self.notify.notify_waiters();

        result
    }
}
