//! Common types and helpers shared among all livecursor crates

mod macros;

#[cfg(any(test, feature = "test-utils"))]
mod test;
#[cfg(any(test, feature = "test-utils"))]
pub use test::*;

pub mod consts;
pub use consts::*;

pub mod error_code;
pub use error_code::ErrorCode;

pub mod logging;

pub mod retry;
pub use retry::{BackoffRetry, RetryableError};

pub mod stream_handles;
pub use stream_handles::*;

pub mod time;

/// Boxed error type used where the concrete error is not interesting.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync>;

pub use futures::stream::BoxStream as BoxDynStream;
