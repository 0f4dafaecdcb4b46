use thiserror::Error;

/// Outcome of an operation that did not succeed under [`crate::RetryPolicy`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// A logic/query error. Returned after the first attempt, never retried,
    /// and never counted by the circuit breaker.
    #[error("non-retryable error: {0}")]
    Fatal(E),

    /// Every attempt failed with a connectivity error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}
