//! Retry classification and backoff for callers that choose to reopen streams.
//!
//! Nothing in the cursor core retries on its own. Errors only report whether a
//! retry could succeed, and [`BackoffRetry`] supplies the delays for callers
//! that decide to reconnect.

use std::time::Duration;

use rand::Rng;
use smart_default::SmartDefault;

/// Specifies which errors are retryable.
/// All Errors are not retryable by-default.
pub trait RetryableError: std::error::Error {
    fn is_retryable(&self) -> bool;
}

impl<E: RetryableError> RetryableError for Box<E> {
    fn is_retryable(&self) -> bool {
        (**self).is_retryable()
    }
}

impl<E: RetryableError> RetryableError for &E {
    fn is_retryable(&self) -> bool {
        (*self).is_retryable()
    }
}

#[macro_export]
macro_rules! retryable {
    ($error: ident) => {{
        #[allow(unused)]
        use $crate::retry::RetryableError;
        $error.is_retryable()
    }};
    ($error: expr) => {{
        use $crate::retry::RetryableError;
        $error.is_retryable()
    }};
}

/// Exponential backoff with a little jitter.
#[derive(SmartDefault, Debug, PartialEq, Eq, Copy, Clone)]
pub struct BackoffRetry {
    #[default = 5]
    max_retries: usize,
    #[default(_code = "std::time::Duration::from_millis(50)")]
    duration: Duration,
    #[default = 3]
    multiplier: u32,
    #[default(_code = "std::time::Duration::from_secs(30)")]
    max_duration: Duration,
    attempts: usize,
}

impl BackoffRetry {
    pub fn builder() -> BackoffRetryBuilder {
        BackoffRetryBuilder::default()
    }

    pub fn retries(&self) -> usize {
        self.max_retries
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// The delay to wait before the next attempt. Each call counts as an attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=25);
        let duration = self.duration;
        self.duration = (self.duration * self.multiplier).min(self.max_duration);
        self.attempts += 1;
        duration + Duration::from_millis(jitter)
    }

    /// Restart the schedule after a successful attempt.
    pub fn reset(&mut self, initial: BackoffRetry) {
        *self = initial;
    }
}

/// Builder for [`BackoffRetry`].
///
/// # Example
/// ```
/// use livecursor_common::retry::BackoffRetry;
///
/// let retry = BackoffRetry::builder()
///     .retries(3)
///     .duration(std::time::Duration::from_millis(100))
///     .build();
/// assert_eq!(retry.retries(), 3);
/// ```
#[derive(Default, PartialEq, Eq, Copy, Clone)]
pub struct BackoffRetryBuilder {
    retries: Option<usize>,
    duration: Option<Duration>,
    multiplier: Option<u32>,
    max_duration: Option<Duration>,
}

impl BackoffRetryBuilder {
    /// Specify the number of retries to allow
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Specify the first delay
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn build(self) -> BackoffRetry {
        let mut retry = BackoffRetry::default();
        if let Some(retries) = self.retries {
            retry.max_retries = retries;
        }
        if let Some(duration) = self.duration {
            retry.duration = duration;
        }
        if let Some(multiplier) = self.multiplier {
            retry.multiplier = multiplier;
        }
        if let Some(max_duration) = self.max_duration {
            retry.max_duration = max_duration;
        }
        retry
    }
}
