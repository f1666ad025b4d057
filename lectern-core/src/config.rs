//! Configuration types

use crate::error::ConfigError;
use std::time::Duration;

/// Default number of attempts for every store operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

const ENV_MAX_ATTEMPTS: &str = "LECTERN_DB_RETRY_MAX_ATTEMPTS";
const ENV_BASE_DELAY_MS: &str = "LECTERN_DB_RETRY_BASE_DELAY_MS";

/// Retry policy applied to store operations.
///
/// Invariants: `max_attempts >= 1` and `base_delay > 0`. Both are enforced by
/// [`RetryPolicy::new`]; the fields are private so a constructed policy is
/// always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Build a policy, rejecting zero attempts or a zero delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, ConfigError> {
        Self::validated(max_attempts, base_delay, ("max_attempts", "base_delay"))
    }

    fn validated(
        max_attempts: u32,
        base_delay: Duration,
        (attempts_field, delay_field): (&str, &str),
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: attempts_field.to_string(),
                value: max_attempts.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if base_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: delay_field.to_string(),
                value: format!("{:?}", base_delay),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    /// Load the policy from environment variables.
    ///
    /// Environment variables:
    /// - `LECTERN_DB_RETRY_MAX_ATTEMPTS`: attempts per operation (default: 5)
    /// - `LECTERN_DB_RETRY_BASE_DELAY_MS`: base backoff in milliseconds (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the policy through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts = match lookup(ENV_MAX_ATTEMPTS) {
            Some(raw) => parse_var::<u32>(ENV_MAX_ATTEMPTS, &raw)?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let base_delay = match lookup(ENV_BASE_DELAY_MS) {
            Some(raw) => Duration::from_millis(parse_var::<u64>(ENV_BASE_DELAY_MS, &raw)?),
            None => DEFAULT_BASE_DELAY,
        };

        Self::validated(max_attempts, base_delay, (ENV_MAX_ATTEMPTS, ENV_BASE_DELAY_MS))
    }

    /// Maximum number of times an operation is invoked.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay of the backoff schedule.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay slept after `attempt` (1-based) fails: `base_delay * 2^attempt`.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

fn parse_var<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "not a valid unsigned integer".to_string(),
    })
}
