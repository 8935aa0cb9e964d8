//! Payload types, wire frames and the transport seam for live row streams.

pub mod filter;
pub mod frame;
pub mod memory;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use filter::{AttributeFilter, FilterError};
pub use frame::{Frame, SubscribeRequest};
pub use memory::MemorySource;
pub use transport::{FrameStream, LiveTransport, TransportError};
pub use types::{Field, Geometry, GraphObject, Origin, Point, Record, Row, RowBatch, Value};

pub mod prelude {
    pub use super::transport::{FrameStream, LiveTransport, TransportError};
    pub use super::types::{Origin, Record, Row, RowBatch, Value};
}
