use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Clone, Debug)]
pub enum Backoff {
    Exponential { base: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base } => {
                let exp = std::cmp::min(attempt.saturating_sub(1), 20);
                let factor = 1u32 << exp;
                base.saturating_mul(factor)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::exponential(base),
        }
    }
}

impl From<&config::FanoutConfig> for RetryConfig {
    fn from(value: &config::FanoutConfig) -> Self {
        RetryConfig::new(value.max_attempts, value.backoff_base())
    }
}

/// 重试异步操作，直到成功、遇到不可重试错误或用尽次数。
pub async fn retry_async<F, Fut, T, E, P>(config: &RetryConfig, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = config.backoff.delay_at(attempt);
                tracing::debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                sleep(delay).await;
            }
        }
    }
}
