//! Cancellable subscribe-and-poll cursors over live row sources.
//!
//! A [`Subscription`] connects to a source through a [`LiveTransport`] and
//! hands out one [`RealtimeCursor`]. The cursor waits asynchronously for
//! batches of rows and advances through them synchronously. Every row is
//! tagged with its [`Origin`]. Waits can be bounded by a timeout or aborted
//! with a [`CancellationController`].
//!
//! Nothing here reconnects on its own. Errors report whether retrying could
//! help through [`RetryableError`](livecursor_common::RetryableError); the
//! caller decides.

pub mod cancel;
pub mod config;
pub mod cursor;
pub mod error;
pub mod subscription;

pub use cancel::CancellationController;
pub use config::{SubscriptionConfig, SubscriptionConfigBuilder};
pub use cursor::{CursorState, CursorStats, RealtimeCursor};
pub use error::{CancelReason, CursorError, Result};
pub use subscription::{PumpSummary, Subscription};

pub use livecursor_proto::{
    AttributeFilter, Field, Frame, FrameStream, Geometry, GraphObject, LiveTransport,
    MemorySource, Origin, Point, Record, Row, RowBatch, SubscribeRequest, TransportError, Value,
};
