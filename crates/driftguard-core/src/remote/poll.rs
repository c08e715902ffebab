//! Bounded polling for operations that complete in another process.

use std::time::{Duration, Instant};

use crate::config::GithubConfig;
use crate::error::DriftError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_github(config: &GithubConfig) -> Self {
        Self::new(
            Duration::from_secs(config.poll_interval_secs),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Call `probe` every `interval` until it is ready or `timeout` has elapsed
/// since `started`. Passing the same `started` to several waits makes them
/// share one budget.
///
/// The probe always runs at least once. Probe errors end the wait immediately.
pub fn poll_until<T, F>(
    policy: PollPolicy,
    started: Instant,
    what: &str,
    mut probe: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> anyhow::Result<Poll<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Poll::Ready(value) = probe()? {
            tracing::debug!(what, attempts, "poll ready");
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(DriftError::Timeout {
                what: what.to_string(),
                seconds: policy.timeout.as_secs(),
            }
            .into());
        }
        std::thread::sleep(policy.interval.min(policy.timeout - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::ZERO, Duration::from_secs(5))
    }

    #[test]
    fn test_ready_after_pending() {
        let mut calls = 0;
        let value = poll_until(fast(), Instant::now(), "thing", || {
            calls += 1;
            Ok(if calls < 3 { Poll::Pending } else { Poll::Ready(calls) })
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_times_out() {
        let policy = PollPolicy::new(Duration::ZERO, Duration::ZERO);
        let err = poll_until::<(), _>(policy, Instant::now(), "workflow run", || Ok(Poll::Pending))
            .unwrap_err();
        let drift = err.downcast_ref::<DriftError>().expect("typed timeout");
        assert!(matches!(drift, DriftError::Timeout { .. }));
        assert!(err.to_string().contains("workflow run"));
    }

    #[test]
    fn test_probe_error_stops_polling() {
        let mut calls = 0;
        let result = poll_until::<(), _>(fast(), Instant::now(), "run", || {
            calls += 1;
            anyhow::bail!("HTTP 401")
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_shared_budget_counts_from_start() {
        let policy = PollPolicy::new(Duration::ZERO, Duration::from_millis(50));
        let started = Instant::now() - Duration::from_millis(60);
        let mut calls = 0;
        let err = poll_until::<(), _>(policy, started, "run", || {
            calls += 1;
            Ok(Poll::Pending)
        })
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<DriftError>(), Some(DriftError::Timeout { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_policy_from_github() {
        let policy = PollPolicy::from_github(&GithubConfig::default());
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.timeout, Duration::from_secs(900));
    }
}
