use crate::error::TransportError;
use runctl_core::settings::{
    parse_optional_flag_env, parse_optional_positive_u64_env, parse_optional_u64_env,
    SettingsError,
};
use runctl_core::{
    RUNCTL_ENV_RETRY_BASE_BACKOFF_MS, RUNCTL_ENV_RETRY_HARDENED, RUNCTL_ENV_RETRY_MAX_RETRIES,
};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Duration;

const RETRY_MAX_RETRIES_DEFAULT: usize = 3;
const RETRY_BASE_BACKOFF_MS_DEFAULT: u64 = 1_000;
const RETRY_MAX_BACKOFF_SHIFT: usize = 16;

/// HTTP status codes worth repeating a request for. Plain data so the set
/// can be tuned per deployment without touching the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableStatuses {
    ranges: Vec<RangeInclusive<u16>>,
    codes: BTreeSet<u16>,
}

impl Default for RetryableStatuses {
    fn default() -> Self {
        Self::server_errors()
    }
}

impl RetryableStatuses {
    pub fn none() -> Self {
        Self {
            ranges: Vec::new(),
            codes: BTreeSet::new(),
        }
    }

    /// Every 5xx.
    pub fn server_errors() -> Self {
        Self {
            ranges: vec![500..=599],
            codes: BTreeSet::new(),
        }
    }

    /// 5xx plus the codes the management service is known to return for
    /// transient upstream trouble.
    pub fn hardened() -> Self {
        Self::server_errors().with_codes([400, 502, 504])
    }

    pub fn with_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.codes.extend(codes);
        self
    }

    pub fn with_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn contains(&self, code: u16) -> bool {
        self.codes.contains(&code) || self.ranges.iter().any(|range| range.contains(&code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: usize,
    pub base_backoff: Duration,
    pub retryable: RetryableStatuses,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RETRY_MAX_RETRIES_DEFAULT,
            base_backoff: Duration::from_millis(RETRY_BASE_BACKOFF_MS_DEFAULT),
            retryable: RetryableStatuses::default(),
        }
    }
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
            retryable: RetryableStatuses::none(),
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`.
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let shift = retry.min(RETRY_MAX_BACKOFF_SHIFT) as u32;
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    /// Only HTTP status errors are ever retried; network failures and
    /// decode failures go straight back to the caller.
    pub fn is_retryable(&self, err: &TransportError) -> bool {
        err.status_code()
            .is_some_and(|code| self.retryable.contains(code))
    }
}

pub fn resolve_retry_policy_from_env() -> Result<RetryPolicy, SettingsError> {
    let mut policy = RetryPolicy::default();
    if let Some(max_retries) = parse_optional_u64_env(RUNCTL_ENV_RETRY_MAX_RETRIES)? {
        policy.max_retries = max_retries as usize;
    }
    if let Some(base_backoff_ms) = parse_optional_positive_u64_env(RUNCTL_ENV_RETRY_BASE_BACKOFF_MS)?
    {
        policy.base_backoff = Duration::from_millis(base_backoff_ms);
    }
    if parse_optional_flag_env(RUNCTL_ENV_RETRY_HARDENED)?.unwrap_or(false) {
        policy.retryable = RetryableStatuses::hardened();
    }
    Ok(policy)
}
