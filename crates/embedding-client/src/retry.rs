//! Transport-agnostic retry combinator.
//!
//! Attempts run strictly one after another; between two attempts the
//! combinator waits `policy.delay_after(n)` on the injected [`Sleeper`], which
//! lets tests substitute a recording clock for real time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Source of delays between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Real wall-clock sleeper backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

type DelayFn = dyn Fn(u32) -> Duration + Send + Sync;

/// How many attempts to make and how long to wait after each failure.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Arc<DelayFn>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("first_delay", &self.delay_after(1))
            .finish()
    }
}

impl RetryPolicy {
    /// `retries` attempts (at least one) separated by a constant `delay`.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self::with_delay_fn(retries, move |_| delay)
    }

    /// `retries` attempts (at least one); `delay(n)` is the pause after failed attempt `n` (1-based).
    pub fn with_delay_fn<F>(retries: u32, delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts: retries.max(1),
            delay: Arc::new(delay),
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.delay)(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

/// Why [`retry`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the final failure.
    Exhausted { attempts: u32, last: E },
    /// The token fired; no further attempt was started.
    Cancelled { attempts: u32, last: Option<E> },
}

/// Run `op(attempt)` until it succeeds, the policy is exhausted or `cancel` fires.
pub async fn retry<T, E, F, Fut, S>(
    policy: &RetryPolicy,
    sleeper: &S,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    S: Sleeper,
{
    let max_attempts = policy.max_attempts();
    let mut last: Option<E> = None;
    let mut attempt = 0;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(RetryError::Cancelled {
                attempts: attempt,
                last,
            });
        }
        attempt += 1;

        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                r = op(attempt) => r,
            },
            None => op(attempt).await,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if attempt >= max_attempts {
            warn!(attempt, max_attempts, error = %err, "final attempt failed");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(attempt, max_attempts, error = %err, delay_ms = delay.as_millis() as u64, "attempt failed; retrying");
        last = Some(err);

        match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                () = sleeper.sleep(delay) => {}
            },
            None => sleeper.sleep(delay).await,
        }
    }
}
