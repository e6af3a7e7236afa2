//! Retry loop for transient storage failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use tessera_core::StoreError;

/// Retry policy for the networked adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retry_count: u32,
    /// Fixed delay between attempts, milliseconds.
    #[serde(rename = "retryInterval")]
    pub retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 3,
            retry_interval_ms: 500,
        }
    }
}

/// Run `op`, retrying transient failures per `config`.
///
/// Permanent failures surface immediately; transient ones surface after the
/// retry budget is exhausted.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retry_count => {
                attempt += 1;
                warn!(operation, attempt, error = %err, "transient storage failure, retrying");
                tokio::time::sleep(Duration::from_millis(config.retry_interval_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
