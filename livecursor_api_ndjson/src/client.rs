use crate::stream::TerminatingStream;
use crate::wire::{self, Handshake};
use futures::StreamExt;
use livecursor_common::time::{timeout, Duration};
use livecursor_common::{DEFAULT_CONNECT_TIMEOUT, MAX_CONTROL_LINE_LEN, MAX_FRAME_LEN};
use livecursor_proto::{FrameStream, LiveTransport, SubscribeRequest, TransportError};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use url::Url;

/// Subscribes to an [`NdjsonServer`](crate::NdjsonServer) at a
/// `tcp://host:port` URI.
#[derive(Debug, Clone)]
pub struct NdjsonTransport {
    connect_timeout: Duration,
    max_frame_len: usize,
}

impl Default for NdjsonTransport {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl NdjsonTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds both the TCP connect and the handshake.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Longest frame line accepted from the server, in bytes. A longer frame
    /// fails the stream with [`TransportError::Oversized`].
    pub fn max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

/// Host and port out of a `tcp://` URI.
fn endpoint(uri: &str) -> Result<(String, u16), TransportError> {
    let url = Url::parse(uri).map_err(|e| TransportError::unreachable(uri, e))?;
    if url.scheme() != "tcp" {
        return Err(TransportError::unreachable(
            uri,
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::unreachable(uri, "missing host"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port()
        .ok_or_else(|| TransportError::unreachable(uri, "missing port"))?;
    Ok((host, port))
}

fn handshake_error(uri: String, e: wire::ErrorResponse) -> TransportError {
    // keep unreachable sources retryable across the hop
    if e.code == "TransportError::Unreachable" {
        return TransportError::unreachable(uri, e.message);
    }
    TransportError::Rejected {
        code: e.code,
        message: e.message,
    }
}

#[async_trait::async_trait]
impl LiveTransport for NdjsonTransport {
    #[tracing::instrument(level = "debug", skip(self), fields(uri = %request.uri))]
    async fn subscribe(&self, request: SubscribeRequest) -> Result<FrameStream, TransportError> {
        let (host, port) = endpoint(&request.uri)?;
        let socket = timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|e| TransportError::unreachable(&request.uri, e))?
            .map_err(|e| TransportError::unreachable(&request.uri, e))?;
        socket.set_nodelay(true)?;

        let mut socket = BufReader::new(socket);
        wire::write_line(&mut socket, &request).await?;

        let line = timeout(
            self.connect_timeout,
            wire::read_line(&mut socket, MAX_CONTROL_LINE_LEN),
        )
        .await
        .map_err(|e| TransportError::unreachable(&request.uri, e))??
        .ok_or(TransportError::Closed)?;
        match serde_json::from_str::<Handshake>(&line)? {
            Handshake::Accepted { accepted: true } => (),
            Handshake::Accepted { accepted: false } => {
                return Err(TransportError::Rejected {
                    code: "Handshake::Refused".to_string(),
                    message: "server refused the subscription".to_string(),
                })
            }
            Handshake::Err(e) => return Err(handshake_error(request.uri, e)),
        }
        tracing::debug!("handshake accepted");

        Ok(TerminatingStream::new(wire::decode_frames(socket, self.max_frame_len)).boxed())
    }
}
