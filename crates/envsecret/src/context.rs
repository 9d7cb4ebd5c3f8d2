//! Cancellation and deadline propagation for a resolution pass

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SecretError;

/// Execution context handed to every fetch.
///
/// The resolver never inspects it beyond stopping when it is cancelled or its
/// deadline passes. Fetchers may use [`remaining`](Self::remaining) to bound
/// their own I/O.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ResolveContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now. A timeout too large to represent as an
    /// instant, such as [`Duration::MAX`], sets no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` if there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fail if the context is already cancelled or past its deadline
    pub fn check(&self) -> Result<(), SecretError> {
        if self.token.is_cancelled() {
            return Err(SecretError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Err(SecretError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Completes once the context is cancelled or its deadline passes
    pub async fn done(&self) -> SecretError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => SecretError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => SecretError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                SecretError::Cancelled
            }
        }
    }
}
