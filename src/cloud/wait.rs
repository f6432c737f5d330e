//! State-change waiter
//!
//! Polls a refresh function until a long-running operation reaches one of
//! its target states.

use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?})",
        .target.join(", ")
    )]
    Timeout {
        target: Vec<String>,
        last_state: String,
        timeout: Duration,
    },
    #[error("unexpected state '{state}', wanted target '{}'", .target.join(", "))]
    UnexpectedState { state: String, target: Vec<String> },
}

/// Polling configuration for one wait
pub struct StateChangeConf<F> {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Returns the latest object and its state
    pub refresh: F,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
}

impl<F, Fut> StateChangeConf<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(Value, String)>>,
{
    pub fn new(pending: &[&str], target: &[&str], refresh: F) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            refresh,
            timeout: Duration::from_secs(20 * 60),
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(10),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll until a target state is reached; refresh errors abort immediately.
    /// A refresh that outlives the deadline counts as a timeout.
    pub async fn wait_for_state(mut self) -> Result<Value> {
        let deadline = Instant::now() + self.timeout;
        let mut last_state = String::new();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay.min(self.timeout)).await;
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let refreshed = tokio::time::timeout(remaining, (self.refresh)()).await;
            let Ok(refreshed) = refreshed else {
                return Err(WaitError::Timeout {
                    target: self.target.clone(),
                    last_state,
                    timeout: self.timeout,
                }
                .into());
            };
            let (value, state) = refreshed?;
            tracing::debug!("waiting for {:?}, current state: {}", self.target, state);

            if self.target.contains(&state) {
                return Ok(value);
            }
            if !self.pending.contains(&state) {
                return Err(WaitError::UnexpectedState {
                    state,
                    target: self.target.clone(),
                }
                .into());
            }
            last_state = state;

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    target: self.target.clone(),
                    last_state,
                    timeout: self.timeout,
                }
                .into());
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
