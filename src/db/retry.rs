use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::sleep;

use crate::errors::{AppError, AppResult};

/// Backoff applied to store writes that hit SQLite lock contention.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_millis(200),
            multiplier: 1.2,
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
pub fn is_lock_contention(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db) = err {
        let primary = db
            .code()
            .and_then(|c| c.parse::<i32>().ok())
            .map(|c| c & 0xff);
        if matches!(primary, Some(5) | Some(6)) {
            return true;
        }
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("database is locked") || msg.contains("database table is locked")
}

/// Run `op` until it succeeds, fails with something other than lock
/// contention, or the policy's attempts are used up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Err(AppError::Database(e))
                if is_lock_contention(&e) && attempt < policy.max_attempts =>
            {
                counter!("store_lock_retries").increment(1);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store locked, retrying"
                );
                sleep(delay).await;
                delay = delay.mul_f64(policy.multiplier);
                attempt += 1;
            }
            other => return other,
        }
    }
}
