// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Invocations that crash are re-dispatched. This module contains the types defining how often
//! and how far apart.

use std::borrow::Cow;
use std::cmp;
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use rand::Rng;
use serde_with::serde_as;

const DEFAULT_JITTER_MULTIPLIER: f32 = 0.3;

/// This struct represents the policy to execute retries.
///
/// ```rust
/// use std::time::Duration;
/// use reprise_types::retries::RetryPolicy;
///
/// let retry_policy = RetryPolicy::fixed_delay(Duration::from_millis(100), Some(10));
/// let mut retry_iter = retry_policy.into_iter();
///
/// loop {
/// # let operation_succeeded = true;
///     if operation_succeeded {
///         break;
///     }
///     match retry_iter.next() {
///         Some(_next_timer) => { /* sleep */ }
///         None => break, // exhausted
///     }
/// }
/// ```
#[serde_as]
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
pub enum RetryPolicy {
    /// No retry strategy.
    #[default]
    None,
    /// Retry with a fixed delay strategy.
    FixedDelay {
        /// Interval between retries, in humantime format, for example `5s`.
        #[serde_as(as = "serde_with::DisplayFromStr")]
        interval: humantime::Duration,
        /// Number of maximum attempts before giving up. Infinite retries if unset.
        max_attempts: Option<NonZeroUsize>,
    },
    /// Retry with an exponential strategy. The next retry is computed as
    /// `min(last_retry_interval * factor, max_interval)`.
    Exponential {
        #[serde_as(as = "serde_with::DisplayFromStr")]
        initial_interval: humantime::Duration,
        factor: f32,
        max_attempts: Option<NonZeroUsize>,
        #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
        #[serde(default)]
        max_interval: Option<humantime::Duration>,
    },
}

impl RetryPolicy {
    pub fn fixed_delay(interval: Duration, max_attempts: Option<usize>) -> Self {
        Self::FixedDelay {
            interval: interval.into(),
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
        }
    }

    pub fn exponential(
        initial_interval: Duration,
        factor: f32,
        max_attempts: Option<usize>,
        max_interval: Option<Duration>,
    ) -> Self {
        Self::Exponential {
            initial_interval: initial_interval.into(),
            factor,
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
            max_interval: max_interval.map(Into::into),
        }
    }

    pub fn max_attempts(&self) -> Option<NonZeroUsize> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay { max_attempts, .. }
            | RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based), `None` once the policy is exhausted.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        self.iter().nth(attempt - 1)
    }

    /// Retry the provided closure respecting this retry policy.
    pub async fn retry<T, E, Fn, Fut>(self, mut operation: Fn) -> Result<T, E>
    where
        Fn: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retry_iter = self.into_iter();
        loop {
            match (operation().await, retry_iter.next()) {
                (Ok(res), _) => return Ok(res),
                (Err(e), None) => return Err(e),
                (Err(_), Some(timer)) => {
                    tokio::time::sleep(timer).await;
                }
            }
        }
    }

    pub fn iter(&self) -> RetryIter<'_> {
        RetryIter {
            policy: Cow::Borrowed(self),
            attempts: 0,
            last_retry: None,
        }
    }
}

impl IntoIterator for RetryPolicy {
    type Item = Duration;
    type IntoIter = RetryIter<'static>;

    fn into_iter(self) -> Self::IntoIter {
        RetryIter {
            policy: Cow::Owned(self),
            attempts: 0,
            last_retry: None,
        }
    }
}

#[derive(Debug)]
pub struct RetryIter<'a> {
    policy: Cow<'a, RetryPolicy>,
    attempts: usize,
    last_retry: Option<Duration>,
}

impl RetryIter<'_> {
    /// The number of attempts on this retry iterator so far
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn last_retry(&self) -> Option<Duration> {
        self.last_retry
    }
}

impl Iterator for RetryIter<'_> {
    type Item = Duration;

    /// adds up to 1/3 target duration as jitter
    fn next(&mut self) -> Option<Self::Item> {
        self.attempts += 1;
        match self.policy.as_ref() {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay {
                interval,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|limit| self.attempts > limit.into()) {
                    None
                } else {
                    Some(with_jitter(**interval, DEFAULT_JITTER_MULTIPLIER))
                }
            }
            RetryPolicy::Exponential {
                initial_interval,
                factor,
                max_attempts,
                max_interval,
            } => {
                if max_attempts.is_some_and(|limit| self.attempts > limit.into()) {
                    return None;
                }
                let next = match self.last_retry {
                    Some(last) => cmp::min(
                        last.mul_f32(*factor),
                        max_interval.map(Into::into).unwrap_or(Duration::MAX),
                    ),
                    None => **initial_interval,
                };
                self.last_retry = Some(next);
                Some(with_jitter(next, DEFAULT_JITTER_MULTIPLIER))
            }
        }
    }
}

// Jitter ranges from 3ms to (max_multiplier * duration). The +3ms floor keeps delays away from
// round values.
static MIN_JITTER: Duration = Duration::from_millis(3);

pub fn with_jitter(duration: Duration, max_multiplier: f32) -> Duration {
    let max_jitter = duration.mul_f32(max_multiplier);
    if max_jitter <= MIN_JITTER {
        duration + MIN_JITTER
    } else {
        let jitter = rand::rng().random_range(MIN_JITTER..max_jitter);
        duration + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn assert_within_jitter(expected: Duration, actual: Duration) {
        let min_inclusive = expected;
        let max_exclusive = expected.mul_f32(1.0 + DEFAULT_JITTER_MULTIPLIER) + MIN_JITTER;
        assert!(
            min_inclusive <= actual && actual <= max_exclusive,
            "expected {actual:?} to be within [{min_inclusive:?}, {max_exclusive:?}]"
        );
    }

    #[test]
    fn no_retry_policy() {
        assert_eq!(
            Vec::<Duration>::new(),
            RetryPolicy::None.into_iter().collect::<Vec<_>>()
        )
    }

    #[test]
    fn fixed_delay_retry_policy() {
        let actuals = RetryPolicy::fixed_delay(Duration::from_millis(100), Some(10))
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(actuals.len(), 10);
        for actual in actuals {
            assert_within_jitter(Duration::from_millis(100), actual);
        }
    }

    #[test]
    fn exponential_retry_policy_is_capped() {
        let expected = [
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(500),
            Duration::from_millis(500),
        ];
        let actuals = RetryPolicy::exponential(
            Duration::from_millis(100),
            2.0,
            Some(5),
            Some(Duration::from_millis(500)),
        )
        .into_iter()
        .collect::<Vec<_>>();
        assert_eq!(actuals.len(), expected.len());
        for (expected, actual) in expected.iter().zip(actuals) {
            assert_within_jitter(*expected, actual);
        }
    }

    #[test]
    fn delay_for_attempt_respects_max_attempts() {
        let policy = RetryPolicy::fixed_delay(Duration::from_millis(10), Some(2));
        assert!(policy.delay_for_attempt(0).is_none());
        assert!(policy.delay_for_attempt(1).is_some());
        assert!(policy.delay_for_attempt(2).is_some());
        assert!(policy.delay_for_attempt(3).is_none());
        assert!(RetryPolicy::None.delay_for_attempt(1).is_none());
    }

    #[test]
    fn deserializes_humantime_durations() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"type": "exponential", "initial-interval": "50ms", "factor": 2.0, "max-attempts": 3, "max-interval": "1s"}"#,
        )
        .unwrap();
        assert_eq!(
            policy,
            RetryPolicy::exponential(
                Duration::from_millis(50),
                2.0,
                Some(3),
                Some(Duration::from_secs(1))
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let counter = Arc::new(AtomicU64::new(0));
        let result: Result<(), ()> = RetryPolicy::fixed_delay(Duration::from_millis(100), Some(3))
            .retry(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Err(())
                }
            })
            .await;

        assert!(result.is_err());
        // first attempt plus three retries
        assert_eq!(counter.load(Ordering::Relaxed), 4);
    }
}
