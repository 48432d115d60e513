//! Wait computation between retry attempts.
//!
//! Quota errors from hosted backends usually say how long to wait, in one
//! of a few textual forms:
//!
//! - `You have exceeded your GPU quota (60s left). Retry in 0:01:30`
//! - `rate limit reached, try again in 45 seconds`
//! - `quota exhausted, resets in 2 minutes`
//! - `Too many requests. Retry after 1 h`
//!
//! The `HH:MM:SS` form is checked first; the unit forms are only consulted
//! when it is absent.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Added on top of a parsed quota wait.
pub const QUOTA_BUFFER: Duration = Duration::from_secs(5);

/// Used when a quota message carries no usable duration.
pub const DEFAULT_QUOTA_WAIT: Duration = Duration::from_secs(60);

static HMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2}):(\d{2})\b").expect("hh:mm:ss regex")
});
static SECONDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(?:seconds?|secs?)\b").expect("seconds regex")
});
static MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(?:minutes?|mins?)\b").expect("minutes regex")
});
static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(?:hours?|h)\b").expect("hours regex"));

/// Why a particular wait was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Duration parsed from a quota message, plus [`QUOTA_BUFFER`]
    QuotaParsed,
    /// Quota message without a usable duration
    QuotaDefault,
    /// Plain exponential backoff
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitDecision {
    pub wait: Duration,
    pub reason: WaitReason,
}

/// Whether an error message describes quota exhaustion or throttling.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("rate limit") || lower.contains("too many requests")
}

/// Extract a wait duration from a message, if one is present.
pub fn parse_quota_wait(message: &str) -> Option<Duration> {
    if let Some(caps) = HMS_RE.captures(message) {
        let hours: u64 = caps[1].parse().ok()?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: u64 = caps[3].parse().ok()?;
        return Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds));
    }

    let unit_patterns: [(&Regex, u64); 3] =
        [(&*SECONDS_RE, 1), (&*MINUTES_RE, 60), (&*HOURS_RE, 3600)];
    unit_patterns.into_iter().find_map(|(re, scale)| {
        let caps = re.captures(message)?;
        let value: u64 = caps[1].parse().ok()?;
        Some(Duration::from_secs(value.saturating_mul(scale)))
    })
}

/// Decide how long to wait before retry number `attempt` (0-based).
pub fn compute_wait(message: &str, attempt: u32, initial_delay: Duration) -> WaitDecision {
    if is_rate_limit_message(message) {
        return match parse_quota_wait(message) {
            Some(wait) if !wait.is_zero() => WaitDecision {
                wait: wait + QUOTA_BUFFER,
                reason: WaitReason::QuotaParsed,
            },
            _ => WaitDecision {
                wait: DEFAULT_QUOTA_WAIT,
                reason: WaitReason::QuotaDefault,
            },
        };
    }

    let factor = 2u32.saturating_pow(attempt);
    WaitDecision {
        wait: initial_delay.saturating_mul(factor),
        reason: WaitReason::Backoff,
    }
}
