use crate::error::RagError;
use std::future::Future;
use std::time::Duration;

/// Runs one remote call under a deadline. On expiry the future is dropped,
/// which cancels the in-flight request.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, RagError>
where
    F: Future<Output = Result<T, RagError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout { operation, limit }),
    }
}
