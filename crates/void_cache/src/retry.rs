//! Retry policies for failed fetches
//!
//! A policy is asked after every failed attempt. Retrying reuses the entry's
//! fetch function with the next attempt number and keeps the queued
//! callbacks; it never creates a new entry.

use crate::error::{CacheError, TransportError};

/// Decides whether a failed fetch is attempted again
pub trait RetryPolicy: Send + Sync {
    /// `attempt` counts the attempts already made, starting at 1
    fn should_retry(&self, error: &CacheError, attempt: u32) -> bool;
}

/// Never retry
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _error: &CacheError, _attempt: u32) -> bool {
        false
    }
}

/// Retry only authorization-expiry failures, up to `max_attempts` in total
#[derive(Clone, Copy, Debug)]
pub struct AuthExpiryRetry {
    pub max_attempts: u32,
}

impl AuthExpiryRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl Default for AuthExpiryRetry {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy for AuthExpiryRetry {
    fn should_retry(&self, error: &CacheError, attempt: u32) -> bool {
        matches!(
            error,
            CacheError::Transport(TransportError::AuthorizationExpired(_))
        ) && attempt < self.max_attempts
    }
}

impl<F> RetryPolicy for F
where
    F: Fn(&CacheError, u32) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &CacheError, attempt: u32) -> bool {
        self(error, attempt)
    }
}
