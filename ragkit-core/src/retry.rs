//! Bounded retry with exponential backoff for remote API calls.
//!
//! Every hosted service this crate talks to can return transient failures
//! (rate limits, timeouts, dropped connections). `with_retry` wraps an async
//! operation with a bounded, capped exponential backoff that respects a
//! server-provided retry-after hint. Permanent failures (authentication,
//! malformed responses) are returned immediately.

use crate::error::{EmbeddingError, IndexError, LlmError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single backoff, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the backoff after each attempt.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to each backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Classification of an error for retry purposes.
pub trait Retryable {
    /// Whether the error is transient and worth retrying.
    fn is_transient(&self) -> bool;

    /// Server-provided wait hint, if the service sent one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Timeout { .. } | LlmError::Connection { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

impl Retryable for EmbeddingError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimited { .. } | EmbeddingError::Connection { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            EmbeddingError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

impl Retryable for IndexError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexError::RateLimited { .. } | IndexError::Connection { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            IndexError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Execute an async operation, retrying transient errors with exponential backoff.
///
/// A server retry-after hint overrides the computed backoff when it is larger.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_transient() || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Compute backoff delay for an attempt, honoring a server retry-after hint.
fn compute_backoff<E: Retryable>(config: &RetryConfig, attempt: u32, err: &E) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    match err.retry_after() {
        Some(hint) => (hint.as_millis() as u64).max(computed),
        None => computed,
    }
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Clock-based pseudo-random in [0, 1) for jitter (avoids pulling in rand).
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
