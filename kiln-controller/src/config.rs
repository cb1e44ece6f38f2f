//! Controller configuration
//!
//! Defines all configurable parameters of the controller manager: reconcile
//! timeouts, worker pool sizes, work queue backoff and the default service
//! account used by generated plans.

use std::time::Duration;

/// Service account used when neither the run nor the configuration names one
pub const FALLBACK_SERVICE_ACCOUNT: &str = "default";

/// Controller configuration
///
/// All timeouts and pool sizes are configurable to allow tuning for
/// different deployment scenarios (small dev stores vs busy clusters).
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time a single reconcile may take
    pub ctx_timeout: Duration,

    /// Service account used by plans whose run does not name one
    pub service_account_name: String,

    /// Workers reconciling RunRequest keys, per controller
    pub run_max_concurrent_reconciles: usize,

    /// Workers reconciling BuildTemplate keys
    pub template_max_concurrent_reconciles: usize,

    /// First retry delay after a failed reconcile
    pub queue_base_delay: Duration,

    /// Upper bound for the retry delay
    pub queue_max_delay: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            ctx_timeout: Duration::from_secs(300), // 5 minutes
            service_account_name: "pipeline".to_string(),
            run_max_concurrent_reconciles: 2,
            template_max_concurrent_reconciles: 2,
            queue_base_delay: Duration::from_millis(5),
            queue_max_delay: Duration::from_secs(1000),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - CTX_TIMEOUT (seconds, default: 300)
    /// - DEFAULT_SERVICE_ACCOUNT (default: pipeline)
    /// - RUN_MAX_CONCURRENT_RECONCILES (default: 2)
    /// - TEMPLATE_MAX_CONCURRENT_RECONCILES (default: 2)
    /// - QUEUE_BASE_DELAY_MS (milliseconds, default: 5)
    /// - QUEUE_MAX_DELAY_SECS (seconds, default: 1000)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let ctx_timeout = parse_env::<u64>("CTX_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.ctx_timeout);

        let service_account_name = std::env::var("DEFAULT_SERVICE_ACCOUNT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.service_account_name);

        let run_max_concurrent_reconciles = parse_env::<usize>("RUN_MAX_CONCURRENT_RECONCILES")?
            .unwrap_or(defaults.run_max_concurrent_reconciles);

        let template_max_concurrent_reconciles =
            parse_env::<usize>("TEMPLATE_MAX_CONCURRENT_RECONCILES")?
                .unwrap_or(defaults.template_max_concurrent_reconciles);

        let queue_base_delay = parse_env::<u64>("QUEUE_BASE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.queue_base_delay);

        let queue_max_delay = parse_env::<u64>("QUEUE_MAX_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.queue_max_delay);

        Ok(Self {
            ctx_timeout,
            service_account_name,
            run_max_concurrent_reconciles,
            template_max_concurrent_reconciles,
            queue_base_delay,
            queue_max_delay,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ctx_timeout.is_zero() {
            anyhow::bail!("ctx_timeout must be greater than 0");
        }

        if self.service_account_name.is_empty() {
            anyhow::bail!("service_account_name cannot be empty");
        }

        if self.run_max_concurrent_reconciles == 0 {
            anyhow::bail!("run_max_concurrent_reconciles must be greater than 0");
        }

        if self.template_max_concurrent_reconciles == 0 {
            anyhow::bail!("template_max_concurrent_reconciles must be greater than 0");
        }

        if self.queue_base_delay.is_zero() {
            anyhow::bail!("queue_base_delay must be greater than 0");
        }

        if self.queue_max_delay < self.queue_base_delay {
            anyhow::bail!("queue_max_delay must not be smaller than queue_base_delay");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and parses an optional environment variable
///
/// Unset means `None`; a value that does not parse is an error.
fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}
