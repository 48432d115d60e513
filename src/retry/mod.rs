//! Retry/backoff execution for calls to hosted backends.
//!
//! - [`wait`]: how long to wait before the next attempt
//! - [`executor`]: the retry loop itself
//! - [`log`]: bounded record of retry activity per operation

pub mod executor;
pub mod log;
pub mod wait;

pub use executor::{retry, RetryPolicy, Retryable};
pub use log::{LogEntry, OperationLog};
pub use wait::{compute_wait, parse_quota_wait, WaitDecision, WaitReason};
