use crate::config::ProviderConfig;
use crate::services::provider::ProviderError;
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Exponential backoff without jitter: the delay before retry `n` is `base_delay * multiplier^n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        self.base_delay.mul_f64(self.multiplier.powi(exponent))
    }

    /// Sum of every backoff sleep when all attempts fail.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1)).map(|n| self.delay_for(n)).sum()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(self.multiplier as f32)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .without_max_delay()
    }

    /// Runs `operation` until it succeeds, fails fatally, or uses up `max_attempts` calls.
    ///
    /// # Errors
    /// Fatal errors are returned as-is. Running out of attempts returns
    /// `ProviderError::Exhausted` wrapping the last error.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = AtomicU32::new(0);

        let result = (|| {
            attempts.fetch_add(1, Ordering::Relaxed);
            call()
        })
        .retry(self.backoff())
        .when(ProviderError::is_retryable)
        .notify(|err, delay| {
            tracing::warn!(
                operation,
                attempt = attempts.load(Ordering::Relaxed),
                error = %err,
                "Provider call failed, retrying in {:?}",
                delay
            );
        })
        .await;

        let attempts = attempts.into_inner();
        match result {
            Err(err) if err.is_retryable() => {
                tracing::error!(operation, attempts, error = %err, "Provider call exhausted retries");
                Err(ProviderError::Exhausted { attempts, last: Box::new(err) })
            }
            other => other,
        }
    }
}
