//! Bounded retry executor with adaptive waits.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::log::OperationLog;
use super::wait::{compute_wait, WaitReason};
use crate::error::MayaError;

/// Errors that know whether a retry can help.
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for MayaError {
    fn is_retryable(&self) -> bool {
        MayaError::is_retryable(self)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base, doubled per attempt. Default: 2s
    #[serde(default = "default_initial_delay", with = "duration_secs")]
    pub initial_delay: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if secs.is_finite() && secs >= 0.0 {
            Ok(Duration::from_secs_f64(secs))
        } else {
            Err(serde::de::Error::custom("delay must be a non-negative number"))
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
///
/// The error returned after the last attempt is the operation's own error,
/// untouched.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    op_id: Option<&str>,
    log: Option<&OperationLog>,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!(
                "[{}] Non-retryable failure: {}",
                op_id.unwrap_or("-"),
                err
            );
            return Err(err);
        }

        if attempt >= policy.max_retries {
            tracing::error!(
                "[{}] Giving up after {} attempts: {}",
                op_id.unwrap_or("-"),
                attempt + 1,
                err
            );
            return Err(err);
        }

        let message = err.to_string();
        let decision = compute_wait(&message, attempt, policy.initial_delay);
        let label = match decision.reason {
            WaitReason::QuotaParsed => "quota wait",
            WaitReason::QuotaDefault => "default quota wait",
            WaitReason::Backoff => "backoff",
        };
        tracing::warn!(
            "[{}] Attempt {}/{} failed ({}), waiting {:.1}s: {}",
            op_id.unwrap_or("-"),
            attempt + 1,
            policy.max_retries + 1,
            label,
            decision.wait.as_secs_f64(),
            message
        );

        if let (Some(id), Some(log)) = (op_id, log) {
            log.record(id, attempt + 1, decision.wait, message);
        }

        tokio::time::sleep(decision.wait).await;
        attempt += 1;
    }
}
