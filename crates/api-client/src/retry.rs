use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Retries only `RateLimited`/`Transient` failures, up to 3 attempts total,
/// surfacing any other error immediately (§4.B "the first four are
/// surfaced up; RateLimited and Transient are retried with backoff up to 3
/// attempts then surfaced").
pub async fn retry_rate_limited_or_transient<T, F, Fut>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err @ (Error::RateLimited | Error::Transient(_))) if attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(BASE_DELAY * attempt).await;
                attempt += 1;
                tracing::warn!(error = %err, attempt, "retrying after rate-limit/transient failure");
            }
            Err(err) => return Err(err),
        }
    }
}
