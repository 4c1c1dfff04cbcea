use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Attempt count used by the wallpaper loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runs `f` up to `max_attempts` times back to back, returning the first
/// success or the last error.
pub async fn attempt<F, Fut, T>(f: F, max_attempts: u32) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry(f, max_attempts, Duration::ZERO).await
}

/// Like [`attempt`], sleeping `delay` between attempts. Errors that another
/// try cannot fix are returned straight away.
pub async fn with_retry<F, Fut, T>(mut f: F, max_attempts: u32, delay: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;
    loop {
        debug!("Attempt {} of {}", attempts + 1, max_attempts);
        match f().await {
            Ok(result) => {
                if attempts > 0 {
                    info!("Operation succeeded after {} retries", attempts);
                }
                return Ok(result);
            }
            Err(e) => {
                attempts += 1;
                if !e.is_retryable() {
                    error!("Operation failed with non-retryable error: {}", e);
                    return Err(e);
                }
                if attempts >= max_attempts {
                    error!("Operation failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
                warn!("Attempt {} failed: {}. Retrying...", attempts, e);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}
