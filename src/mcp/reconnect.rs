// ABOUTME: Exponential backoff policy for re-establishing the MCP session
// ABOUTME: delay = min(base * 2^(attempt-1), max)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::McpClientConfig;
use crate::errors::{AppError, AppResult};

/// Upper bound on a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retries a connect operation with exponential backoff
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts before giving up; at least one attempt is always made
    pub max_retries: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Policy derived from the MCP client configuration
    #[must_use]
    pub fn from_config(config: &McpClientConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: config.retry_delay,
            max_delay: MAX_BACKOFF.max(config.retry_delay),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `connect` until it succeeds or the retries are spent
    ///
    /// # Errors
    ///
    /// Returns the last connect error once `max_retries` attempts have failed.
    pub async fn run<F, Fut, T>(&self, target: &str, mut connect: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.max_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match connect().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(target, attempt, "Reconnected to MCP server");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(target, attempt, ?delay, "MCP connect attempt failed: {e}");
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(target, attempt, "Giving up on MCP server: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::external_unavailable("MCP", format!("max retries reached for {target}"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(5), Duration::from_millis(8000));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_until_success() {
        let calls = AtomicU32::new(0);
        let value = policy()
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::external_unavailable("MCP", "refused"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_last_error() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::external_unavailable("MCP", format!("attempt {n}")))
            })
            .await
            .unwrap_err();
        assert!(err.message.contains("attempt 2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
