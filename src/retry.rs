//! Bounded retry for remote calls.
//!
//! Both the table and route query paths share this wrapper: a fixed
//! attempt budget with a fixed inter-attempt delay, and a caller-supplied
//! classification of each failure as transient or fatal.

use std::thread;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(15),
        }
    }
}

/// How an operation failed. `Fatal` aborts immediately (e.g. an HTTP 400
/// is a caller bug — repeating the request cannot help); `Transient` is
/// retried until the attempt budget runs out.
#[derive(Debug)]
pub enum Failure<E> {
    Transient(E),
    Fatal(E),
}

/// Runs `op` up to `policy.max_attempts` times. The closure receives the
/// 1-based attempt number for logging. Returns the last error when the
/// budget is exhausted, or the fatal error as soon as one occurs.
pub fn with_retries<T, E>(
    policy: &RetryPolicy,
    mut op: impl FnMut(u32) -> Result<T, Failure<E>>,
) -> Result<T, E> {
    let attempts = policy.max_attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(Failure::Fatal(err)) => return Err(err),
            Err(Failure::Transient(err)) => {
                if attempt < attempts {
                    warn!("attempt {attempt}/{attempts} failed, retrying");
                    thread::sleep(policy.delay);
                }
                last = Some(err);
            }
        }
    }
    Err(last.expect("at least one attempt runs"))
}
