//! Exponential backoff around a single adapter call.
//!
//! Up to 4 attempts total with 1s, 2s, 4s sleeps between them. Auth and
//! not-found failures (401/403/404 in the error text) are terminal right
//! away, and the sleep races the ambient cancel token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterError;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Statuses that never deserve another attempt, matched on the error text.
fn non_retriable(message: &str) -> bool {
    ["401", "403", "404"]
        .iter()
        .any(|code| message.contains(code))
}

impl RetryPolicy {
    /// Runs `call` until it succeeds, fails terminally, or attempts run out.
    /// The closure receives the 1-based attempt number. The last failure is
    /// the one reported.
    pub async fn run<F, Fut>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        mut call: F,
    ) -> Result<String, AdapterError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<String, AdapterError>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 1u32;
        loop {
            match call(attempt).await {
                Ok(v) => return Ok(v),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    let reason = err.to_string();
                    if non_retriable(&reason) || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "model call failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
