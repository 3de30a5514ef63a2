//! Bounded exponential-backoff retry for flaky I/O.
//!
//! Only errors classified as [`ErrorClass::Transient`] are retried. Anything
//! else is handed back to the caller on the first failure, untouched.

use std::future::Future;
use std::io;
use std::time::Duration;

use rand::Rng;

/// How an error should be treated by [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Implemented by errors that can flow through [`with_retry`].
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

impl Classify for io::Error {
    fn class(&self) -> ErrorClass {
        classify_io(self)
    }
}

/// Classifies a low-level I/O failure.
///
/// Broken pipes, resets, aborts and timeouts are transient. Missing files and
/// denied access are permanent. Any other kind, including the ones the
/// standard library leaves uncategorised, is transient only when its message
/// talks about a timeout or a connection.
#[must_use]
pub fn classify_io(e: &io::Error) -> ErrorClass {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::TimedOut => ErrorClass::Transient,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorClass::Permanent,
        _ => {
            let message = e.to_string().to_lowercase();
            if message.contains("timeout") || message.contains("connection") {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform random term added to every delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows failed attempt number `attempt` (1-based),
    /// without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        let ceiling = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

/// Runs `operation` until it succeeds, fails permanently or the policy runs out of attempts.
///
/// The error returned after the last attempt is the error that attempt produced.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if e.class() == ErrorClass::Permanent || attempt >= max_attempts {
                    return Err(e);
                }
                let delay = policy.backoff(attempt) + policy.jitter();
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
