use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TubeDigestError};

/// Sleep for `delay`, returning early with `Cancelled` if `cancel` fires.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(TubeDigestError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
