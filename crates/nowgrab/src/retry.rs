//! Bounded re-attempts for fallible async work.

use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// `max_attempts` was zero; the operation never ran.
    #[error("no attempts allowed")]
    NoAttempts,
    /// Every attempt failed; carries the last failure.
    #[error("failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Run `operation` up to `max_attempts` times, returning its first success.
///
/// After every failed attempt except the last, `on_attempt_failed` is awaited
/// with the zero-based index of the attempt that failed. Attempts follow each
/// other immediately.
pub async fn with_retry<T, E, Op, Fut, OnFail, FailFut>(
    max_attempts: u32,
    mut operation: Op,
    mut on_attempt_failed: OnFail,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    OnFail: FnMut(u32) -> FailFut,
    FailFut: Future<Output = ()>,
{
    if max_attempts == 0 {
        return Err(RetryError::NoAttempts);
    }

    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                on_attempt_failed(attempt - 1).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[tokio::test]
    async fn test_exhaustion_counts_and_reraises() {
        let calls = Cell::new(0u32);
        let failures = RefCell::new(Vec::new());

        let result: Result<(), _> = with_retry(
            3,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err::<(), String>(format!("boom {}", n)) }
            },
            |attempt| {
                failures.borrow_mut().push(attempt);
                async {}
            },
        )
        .await;

        assert_eq!(calls.get(), 3);
        assert_eq!(*failures.borrow(), vec![0, 1]);
        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source, "boom 3");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_never_runs() {
        let calls = Cell::new(0u32);
        let failures = Cell::new(0u32);

        let result = with_retry(
            0,
            || {
                calls.set(calls.get() + 1);
                async { Ok::<u32, String>(1) }
            },
            |_| {
                failures.set(failures.get() + 1);
                async {}
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::NoAttempts)));
        assert_eq!(calls.get(), 0);
        assert_eq!(failures.get(), 0);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let calls = Cell::new(0u32);
        let failures = Cell::new(0u32);

        let result = with_retry(
            5,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err("not yet")
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| {
                failures.set(failures.get() + 1);
                async {}
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(failures.get(), 2);
    }

    #[tokio::test]
    async fn test_first_success_skips_callback() {
        let failures = Cell::new(0u32);
        let result = with_retry(
            1,
            || async { Ok::<_, String>("done") },
            |_| {
                failures.set(failures.get() + 1);
                async {}
            },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(failures.get(), 0);
    }

    #[test]
    fn test_display_and_source() {
        use std::error::Error as _;

        let err = RetryError::Exhausted {
            attempts: 2,
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"),
        };
        assert_eq!(err.to_string(), "failed after 2 attempt(s): timeout");
        assert_eq!(err.source().map(|e| e.to_string()), Some("timeout".to_string()));

        let none: RetryError<std::io::Error> = RetryError::NoAttempts;
        assert_eq!(none.to_string(), "no attempts allowed");
        assert!(none.source().is_none());
    }
}
