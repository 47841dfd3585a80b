//! Bounded retries with backoff for the I/O stages of a chart request.

use std::future::Future;
use std::time::Duration;

use error_stack::Report;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let scale = 2_u32.saturating_pow(attempt);
                base.saturating_mul(scale).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let base = Duration::from_millis(config.base_delay_ms);
        let backoff = match config.backoff.as_str() {
            "fixed" => Backoff::Fixed(base),
            _ => Backoff::Exponential {
                base,
                max: Duration::from_millis(config.max_delay_ms),
            },
        };
        Self {
            max_retries: config.max_retries,
            backoff,
        }
    }
}

/// Run `op` until it succeeds, `is_retryable` rejects its error, or the
/// policy's retries are exhausted. The last error is returned unchanged.
pub async fn retry<T, C, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    is_retryable: impl Fn(&C) -> bool,
    mut op: F,
) -> Result<T, Report<C>>
where
    C: std::error::Error + Send + Sync + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Report<C>>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(report) => {
                if attempt >= policy.max_retries || !is_retryable(report.current_context()) {
                    return Err(report);
                }
                let delay = policy.backoff.delay(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %report.current_context(),
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
