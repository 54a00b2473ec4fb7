use std::future::Future;
use std::time::Duration;

/// Retries `f` up to `attempts` times with `base_delay * attempt` backoff
/// between tries, returning the last error if all attempts fail.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(base_delay * attempt).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}
