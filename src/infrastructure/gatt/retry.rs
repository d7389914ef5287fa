//! The "reconnect once, retry once" policy shared by every discovery phase

use crate::domain::error::TransportError;
use crate::infrastructure::gatt::transport::GattTransport;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// What an `#[async_trait]` transport method returns
pub type TransportFuture<'a, R> = Pin<Box<dyn Future<Output = Result<R, TransportError>> + Send + 'a>>;

/// Await `fut`, turning an elapsed `limit` into [`TransportError::Timeout`]
pub async fn timed<R>(
    fut: impl Future<Output = Result<R, TransportError>>,
    limit: Duration,
) -> Result<R, TransportError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(TransportError::Timeout))
}

/// Time limits for one call under [`with_one_retry`]
#[derive(Debug, Clone, Copy)]
pub struct RetryLimits {
    /// Each attempt of the operation itself
    pub op: Duration,
    /// The reconnect between the two attempts
    pub reconnect: Duration,
}

/// Run `op`; if it times out, reconnect and run it exactly once more.
///
/// Only timeouts are retried. A failed reconnect is reported as
/// [`TransportError::Link`] since the session is gone at that point.
pub async fn with_one_retry<T, R, F>(
    transport: &mut T,
    limits: RetryLimits,
    what: &str,
    mut op: F,
) -> Result<R, TransportError>
where
    T: GattTransport + ?Sized,
    F: for<'a> FnMut(&'a mut T) -> TransportFuture<'a, R>,
{
    match timed(op(transport), limits.op).await {
        Err(TransportError::Timeout) => {}
        other => return other,
    }

    warn!("{} timed out, reconnecting to retry", what);
    if let Err(e) = timed(transport.reconnect(), limits.reconnect).await {
        return Err(TransportError::Link(format!(
            "reconnect after {} timeout failed: {}",
            what, e
        )));
    }

    let retried = timed(op(transport), limits.op).await;
    match &retried {
        Ok(_) => debug!("{} succeeded on retry", what),
        Err(e) => warn!("{} failed after retry: {}", what, e),
    }
    retried
}
