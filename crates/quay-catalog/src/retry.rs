//! Bounded retry of file-side steps.

use std::future::Future;

use tracing::warn;

use crate::{Error, Result, config::RetryPolicy};

/// Run `step` until it succeeds, up to `policy.attempts` times, sleeping
/// `policy.min_delay()` between tries.
///
/// Only transient store failures are retried; anything else is returned at
/// once. Exhausting every attempt yields [`Error::TransientFile`] carrying
/// the last failure.
pub async fn with_retry<T, F, Fut>(
  policy: RetryPolicy,
  operation: &'static str,
  mut step: F,
) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = quay_store_sqlite::Result<T>>,
{
  let attempts = policy.attempts.max(1);
  let mut attempt = 1;
  loop {
    match step().await {
      Ok(value) => return Ok(value),
      Err(error) if !error.is_transient() => return Err(error.into()),
      Err(error) if attempt >= attempts => {
        return Err(Error::TransientFile { operation, attempts, source: error });
      }
      Err(error) => {
        warn!(
          operation,
          attempt,
          attempts,
          %error,
          "file step failed, retrying"
        );
      }
    }
    tokio::time::sleep(policy.min_delay()).await;
    attempt += 1;
  }
}
