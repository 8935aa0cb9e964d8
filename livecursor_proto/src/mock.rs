//! Mock transport for tests in downstream crates.
use crate::frame::SubscribeRequest;
use crate::transport::{FrameStream, LiveTransport, TransportError};

mockall::mock! {
    pub Transport {}

    #[async_trait::async_trait]
    impl LiveTransport for Transport {
        async fn subscribe(&self, request: SubscribeRequest) -> Result<FrameStream, TransportError>;
    }
}
