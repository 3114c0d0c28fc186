//! Reconnection logic with exponential backoff
//!
//! Delays double on every consecutive failure and are capped at
//! `max_delay_ms`. Random jitter is added on top so that many clients
//! dropped by the same server restart do not reconnect in lockstep.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::errors::{ConnectionError, ConnectionResult};
use crate::config::constants;

/// Configuration for reconnection attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts
    #[serde(default = "constants::max_reconnect_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt in milliseconds (doubles each attempt)
    #[serde(default = "constants::reconnect_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    #[serde(default = "constants::reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter in milliseconds, 0 disables it
    #[serde(default = "constants::reconnect_jitter_ms")]
    pub jitter_ms: u64,
    /// A connection that stays open this long resets the consecutive-failure count
    #[serde(default = "constants::reconnect_stable_after_ms")]
    pub stable_after_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::max_reconnect_attempts(),
            initial_delay_ms: constants::reconnect_initial_delay_ms(),
            max_delay_ms: constants::reconnect_max_delay_ms(),
            jitter_ms: constants::reconnect_jitter_ms(),
            stable_after_ms: constants::reconnect_stable_after_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn stable_after(&self) -> Duration {
        Duration::from_millis(self.stable_after_ms)
    }
}

/// Base delay before reconnect attempt `attempt` (1-based), without jitter
///
/// `min(initial_delay_ms * 2^(attempt - 1), max_delay_ms)`. Attempt 0 is
/// treated as attempt 1. Never decreases as `attempt` grows.
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let ms = config
        .initial_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms);
    Duration::from_millis(ms)
}

/// Backoff delay plus random jitter in `0..jitter_ms`
pub fn delay_with_jitter(config: &ReconnectConfig, attempt: u32) -> Duration {
    let jitter = if config.jitter_ms == 0 {
        0
    } else {
        rand::random::<u64>() % config.jitter_ms
    };
    backoff_delay(config, attempt) + Duration::from_millis(jitter)
}

/// Reconnect with exponential backoff and jitter
///
/// Runs attempts `first_attempt..=max_attempts`, sleeping before each one and
/// then calling `connect_fn(attempt)`. Returns the first successful value, or
/// the last error once the budget is spent. Pass `first_attempt > 1` to carry
/// a consecutive-failure count over from an earlier call; if it already
/// exceeds `max_attempts` no attempt is made. `on_schedule(attempt, delay)`
/// runs before each sleep so callers can publish progress.
///
/// Dropping the returned future cancels the pending sleep and any in-flight
/// attempt.
///
/// # Example
/// ```ignore
/// let stream = reconnect_with_backoff(
///     &config.reconnect,
///     "feed",
///     1,
///     |attempt, delay| tracing::info!(attempt, ?delay, "retrying"),
///     |_| connect_tls(&config.connection),
/// ).await?;
/// ```
pub async fn reconnect_with_backoff<T, F, Fut, H>(
    config: &ReconnectConfig,
    name: &str,
    first_attempt: u32,
    mut on_schedule: H,
    mut connect_fn: F,
) -> ConnectionResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ConnectionResult<T>>,
    H: FnMut(u32, Duration),
{
    let mut last_error: Option<ConnectionError> = None;

    for attempt in first_attempt.max(1)..=config.max_attempts {
        let delay = delay_with_jitter(config, attempt);
        on_schedule(attempt, delay);

        tracing::info!(
            name = name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnect attempt scheduled"
        );

        tokio::time::sleep(delay).await;

        match connect_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    name = name,
                    attempt = attempt,
                    error = %e,
                    "Reconnect attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ConnectionError::ConnectionFailed("Reconnection failed after max attempts".into())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            jitter_ms: 0,
            stable_after_ms: 1000,
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = fast_config(6);
        let delays: Vec<u64> = (1..=6)
            .map(|a| backoff_delay(&config, a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 100, 100]);
    }

    #[test]
    fn test_backoff_attempt_zero_is_initial_delay() {
        let config = fast_config(3);
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(10));
    }

    #[test]
    fn test_backoff_huge_attempt_saturates_at_cap() {
        let config = fast_config(3);
        assert_eq!(backoff_delay(&config, 200), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let config = ReconnectConfig {
            jitter_ms: 50,
            ..fast_config(3)
        };
        for _ in 0..100 {
            let d = delay_with_jitter(&config, 2);
            assert!(d >= Duration::from_millis(20));
            assert!(d < Duration::from_millis(70));
        }
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            initial in 1u64..10_000,
            extra in 0u64..100_000,
            attempt in 1u32..80,
        ) {
            let config = ReconnectConfig {
                max_attempts: 5,
                initial_delay_ms: initial,
                max_delay_ms: initial + extra,
                jitter_ms: 0,
                stable_after_ms: 0,
            };
            let current = backoff_delay(&config, attempt);
            let next = backoff_delay(&config, attempt + 1);
            prop_assert!(next >= current);
            prop_assert!(next <= Duration::from_millis(config.max_delay_ms));
        }
    }

    #[tokio::test]
    async fn test_reconnect_succeeds_on_first_attempt() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();

        let result = reconnect_with_backoff(&fast_config(3), "test", 1, |_, _| {}, |_| {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnect_succeeds_on_second_attempt() {
        let result = reconnect_with_backoff(&fast_config(3), "test", 1, |_, _| {}, |attempt| async move {
            if attempt == 1 {
                Err(ConnectionError::ConnectionFailed("first try".into()))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_exhausts_all_attempts() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();

        let result: ConnectionResult<()> =
            reconnect_with_backoff(&fast_config(5), "test", 1, |_, _| {}, |_| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(ConnectionError::ConnectionFailed("always fail".into()))
                }
            })
            .await;

        // No 6th attempt with max_attempts = 5
        assert_eq!(call_count.load(Ordering::SeqCst), 5);
        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("always fail"),
            "Should contain last error message, got: {}",
            err_msg
        );
    }

    #[tokio::test]
    async fn test_reconnect_reports_increasing_schedule() {
        let mut scheduled = Vec::new();

        let _: ConnectionResult<()> = reconnect_with_backoff(
            &fast_config(4),
            "test",
            1,
            |attempt, delay| scheduled.push((attempt, delay)),
            |_| async { Err(ConnectionError::ConnectionFailed("fail".into())) },
        )
        .await;

        let attempts: Vec<u32> = scheduled.iter().map(|(a, _)| *a).collect();
        assert_eq!(attempts, vec![1, 2, 3, 4]);
        assert!(scheduled.windows(2).all(|w| w[1].1 >= w[0].1));
    }

    #[tokio::test]
    async fn test_first_attempt_carries_budget_over() {
        let mut attempts = Vec::new();

        let _: ConnectionResult<()> = reconnect_with_backoff(
            &fast_config(5),
            "test",
            4,
            |attempt, _| attempts.push(attempt),
            |_| async { Err(ConnectionError::ConnectionFailed("fail".into())) },
        )
        .await;

        assert_eq!(attempts, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_exhausted_budget_makes_no_attempt() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();

        let result: ConnectionResult<()> =
            reconnect_with_backoff(&fast_config(3), "test", 4, |_, _| {}, |_| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_future_cancels_pending_attempt() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let config = ReconnectConfig {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..fast_config(3)
        };

        let fut = reconnect_with_backoff(&config, "test", 1, |_, _| {}, |_| {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let _ = tokio::time::timeout(Duration::from_millis(10), fut).await;
        tokio::time::advance(Duration::from_secs(120)).await;

        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reconnect_config_deserializes_with_defaults() {
        let config: ReconnectConfig = serde_yaml::from_str("max_attempts: 2").unwrap();
        assert_eq!(config.max_attempts, 2);
        assert!(config.initial_delay_ms > 0);
        assert!(config.max_delay_ms >= config.initial_delay_ms);
    }
}
