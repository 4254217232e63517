// In crates/engine/src/retry.rs

use std::future::Future;
use std::time::Duration;

use app_config::GatewaySettings;
use core_types::Symbol;
use execution::{Error, Result};

/// Bounded retry with exponential backoff for exchange calls.
///
/// Every attempt is cut off after `timeout`; a timeout counts as a transient
/// failure. Only transient failures are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    pub async fn call<F, Fut, T>(&self, desc: &str, symbol: &Symbol, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                tracing::info!(
                    call = desc,
                    symbol = %symbol,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying exchange call."
                );
                tokio::time::sleep(delay).await;
            }

            let outcome = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    tracing::warn!(call = desc, symbol = %symbol, attempt = attempt + 1, error = %e, "Transient exchange failure, will retry.");
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(call = desc, symbol = %symbol, attempts = attempt + 1, error = %e, "Retries exhausted.");
                    }
                    return Err(e);
                }
            }
        }
    }
}
