// Copyright (c) 2025 - Cowboy AI, Inc.
//! Convergence Waiting
//!
//! Provider APIs are eventually consistent: a freshly created network may be
//! missing from the next listing, a terminated instance keeps reporting
//! `shutting-down` for a while. Every such wait in this crate goes through
//! [`WaitPolicy`].
//!
//! # Semantics
//!
//! - The probe runs at most `max_attempts` times, sleeping `interval` between
//!   runs and never after the last one. A policy with zero attempts times out
//!   without probing; configuration loading rejects it.
//! - A transient provider error (object "not found yet") counts as "not
//!   converged" and is retried.
//! - Any other error aborts the wait immediately.
//! - Exhaustion yields [`TopologyError::OperationTimedOut`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{TopologyError, TopologyResult};

/// Fixed-interval, bounded-attempt polling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Delay between attempts in milliseconds
    pub interval_ms: u64,

    /// Maximum number of probe calls
    pub max_attempts: u32,
}

impl WaitPolicy {
    /// Intervals beyond `u64::MAX` milliseconds saturate
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            max_attempts,
        }
    }

    /// Policy that polls without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            interval_ms: 0,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Poll `probe` until it returns `true`
    ///
    /// `operation` names the wait in logs and in the timeout error.
    pub async fn until<F, Fut>(&self, operation: &str, mut probe: F) -> TopologyResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TopologyResult<bool>>,
    {
        self.for_value(operation, || {
            let converged = probe();
            async move { converged.await.map(|done| done.then_some(())) }
        })
        .await
    }

    /// Poll `probe` until it yields a value
    pub async fn for_value<T, F, Fut>(&self, operation: &str, mut probe: F) -> TopologyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TopologyResult<Option<T>>>,
    {
        let attempts = self.max_attempts;

        for attempt in 1..=attempts {
            match probe().await {
                Ok(Some(value)) => {
                    debug!("{} converged after {} attempt(s)", operation, attempt);
                    return Ok(value);
                }
                Ok(None) => {
                    debug!("{} not converged ({}/{})", operation, attempt, attempts);
                }
                Err(e) if e.is_transient() => {
                    debug!(
                        "{} not converged ({}/{}): {}",
                        operation, attempt, attempts, e
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                sleep(self.interval()).await;
            }
        }

        warn!("{} did not converge after {} attempts", operation, attempts);
        Err(TopologyError::OperationTimedOut {
            operation: operation.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, DriverErrorKind};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_converges_on_kth_call() {
        let policy = WaitPolicy::new(Duration::from_secs(2), 5);
        let started = Instant::now();
        let mut calls = 0;

        policy
            .until("probe", || {
                calls += 1;
                let done = calls == 3;
                async move { Ok::<_, TopologyError>(done) }
            })
            .await
            .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let policy = WaitPolicy::new(Duration::from_secs(1), 4);
        let started = Instant::now();
        let mut calls = 0;

        let result = policy
            .until("never", || {
                calls += 1;
                async { Ok::<_, TopologyError>(false) }
            })
            .await;

        assert_eq!(calls, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        match result {
            Err(TopologyError::OperationTimedOut {
                operation,
                attempts,
            }) => {
                assert_eq!(operation, "never");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let policy = WaitPolicy::immediate(5);
        let mut calls = 0;

        let value = policy
            .for_value("lookup", || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(TopologyError::from(DriverError::new(
                            DriverErrorKind::NotFound,
                            "not yet",
                        )))
                    } else {
                        Ok(Some(n * 10))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 30);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_immediately() {
        let policy = WaitPolicy::immediate(5);
        let mut calls = 0;

        let result: TopologyResult<()> = policy
            .until("delete", || {
                calls += 1;
                async {
                    Err::<bool, _>(TopologyError::from(DriverError::new(
                        DriverErrorKind::DependencyViolation,
                        "in use",
                    )))
                }
            })
            .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(TopologyError::Provider(_))));
    }

    #[tokio::test]
    async fn test_zero_attempts_never_probes() {
        let mut calls = 0;
        let result = WaitPolicy::immediate(0)
            .until("never", || {
                calls += 1;
                async { Ok::<_, TopologyError>(true) }
            })
            .await;

        assert_eq!(calls, 0);
        assert!(matches!(
            result,
            Err(TopologyError::OperationTimedOut { attempts: 0, .. })
        ));
    }

    #[test]
    fn test_new_saturates_huge_intervals() {
        assert_eq!(WaitPolicy::new(Duration::MAX, 1).interval_ms, u64::MAX);
        assert_eq!(WaitPolicy::new(Duration::from_secs(3), 1).interval_ms, 3000);
    }
}
