//! Time primitives shared by the cursor and its transports

use std::fmt;

#[derive(Debug)]
pub struct Expired;

impl std::error::Error for Expired {}

impl From<tokio::time::error::Elapsed> for Expired {
    fn from(_: tokio::time::error::Elapsed) -> Expired {
        Expired
    }
}

impl fmt::Display for Expired {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        write!(f, "timer duration expired")
    }
}

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::Instant;

fn duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

pub fn now_ns() -> i64 {
    duration_since_epoch().as_nanos() as i64
}

pub async fn timeout<F>(duration: Duration, future: F) -> Result<F::Output, Expired>
where
    F: std::future::IntoFuture,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(Into::into)
}

/// Like [`timeout`], but a `None` duration waits forever.
pub async fn maybe_timeout<F>(duration: Option<Duration>, future: F) -> Result<F::Output, Expired>
where
    F: std::future::IntoFuture,
{
    match duration {
        Some(d) => timeout(d, future).await,
        None => Ok(future.await),
    }
}

#[doc(hidden)]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}
