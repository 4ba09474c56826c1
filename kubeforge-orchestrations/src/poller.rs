//! Fixed-interval polling of long-running provider operations.
//!
//! A poll either fails (the provider call itself errored), reports the
//! resource as still pending, or reports it ready. Consecutive call failures
//! are bounded by `max_retries`; a resource that keeps answering "pending" is
//! waited on for as long as it takes.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outcome of a single successful poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    Ready(T),
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_retries: u32,
}

impl PollerConfig {
    pub const fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
        }
    }

    pub async fn wait_for<T, F, Fut>(&self, what: &str, mut poll: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Readiness<T>>>,
    {
        let mut failures: u32 = 0;
        let mut polls: u64 = 0;
        loop {
            polls += 1;
            match poll().await {
                Ok(Readiness::Ready(value)) => {
                    debug!(what, polls, "ready");
                    return Ok(value);
                }
                Ok(Readiness::Pending) => {
                    failures = 0;
                    debug!(what, polls, "still pending");
                }
                Err(e) if e.is_retryable() => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(Error::Timeout {
                            what: what.to_string(),
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(what, failures, max = self.max_retries, error = %e, "poll failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Intervals and retry budgets for each kind of long-running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub vm: PollerConfig,
    pub network: PollerConfig,
    pub managed: PollerConfig,
}

impl PollerSettings {
    /// Provider defaults: 10s for VMs and managed clusters, 5s for networks,
    /// with a doubled failure budget for VMs
    pub fn with_budget(interval: Duration, max_retries: u32) -> Self {
        Self {
            vm: PollerConfig::new(interval, max_retries.saturating_mul(2)),
            network: PollerConfig::new(interval / 2, max_retries),
            managed: PollerConfig::new(interval, max_retries),
        }
    }

    /// Near-zero intervals for tests and mocks
    pub fn immediate() -> Self {
        let cfg = PollerConfig::new(Duration::from_millis(1), 3);
        Self {
            vm: cfg,
            network: cfg,
            managed: cfg,
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::with_budget(Duration::from_secs(10), 6)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_retries: u32) -> PollerConfig {
        PollerConfig::new(Duration::from_millis(1), max_retries)
    }

    #[tokio::test]
    async fn test_pending_is_not_bounded() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let value = fast(1)
            .wait_for("instance", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 10 {
                    Ok(Readiness::Pending)
                } else {
                    Ok(Readiness::Ready(n))
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_failures_exhaust_budget() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = fast(2)
            .wait_for("network", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Readiness<()>, _>(Error::provider("get_network", "503"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pending_resets_failure_count() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let res = fast(1)
            .wait_for("cluster", move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 2 | 4 => Err(Error::provider("get_cluster", "timeout")),
                    1 | 3 => Ok(Readiness::Pending),
                    _ => Ok(Readiness::Ready("up")),
                }
            })
            .await;
        assert_eq!(res.unwrap(), "up");
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = fast(5)
            .wait_for("instance", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Readiness<()>, _>(Error::storage("disk full"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_settings() {
        let s = PollerSettings::default();
        assert_eq!(s.vm.interval, Duration::from_secs(10));
        assert_eq!(s.vm.max_retries, 12);
        assert_eq!(s.network.interval, Duration::from_secs(5));
    }
}
