use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Runs `operation` once plus up to `retries` more times, sleeping `delay_ms`
/// between attempts. Only transport errors are retried; HTTP status handling is
/// left to the caller.
pub async fn with_retry<F, Fut, T>(mut operation: F, retries: usize, delay_ms: u64) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if attempt > retries => return Err(err.into()),
            Err(err) => {
                debug!(attempt, retries, error = %err, "Request failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Builds the HTTP client shared by the Yahoo providers. Cookies persist for
/// the client's lifetime so the Yahoo session survives across requests.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("valscreen/", env!("CARGO_PKG_VERSION")))
        .cookie_store(true)
        .timeout(timeout)
        .build()?;
    Ok(client)
}
