//! Exposes a [`MemorySource`] to remote subscribers.

use crate::wire::{self, Handshake};
use futures::StreamExt;
use livecursor_common::time::{Duration, Instant};
use livecursor_common::{optify, ErrorCode, DEFAULT_HEARTBEAT_INTERVAL, MAX_CONTROL_LINE_LEN};
use livecursor_proto::{Frame, LiveTransport, MemorySource, SubscribeRequest, TransportError};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct NdjsonServer {
    listener: TcpListener,
    source: MemorySource,
    heartbeat_interval: Duration,
}

impl std::fmt::Debug for NdjsonServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonServer")
            .field("addr", &self.listener.local_addr().ok())
            .field("source", &self.source)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

impl NdjsonServer {
    pub async fn bind(addr: impl ToSocketAddrs, source: MemorySource) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            source,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        })
    }

    /// How often connections get a heartbeat frame. Zero is raised to one millisecond.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The `tcp://` URI clients should subscribe to.
    pub fn uri(&self) -> io::Result<String> {
        Ok(format!("tcp://{}", self.local_addr()?))
    }

    pub fn source(&self) -> &MemorySource {
        &self.source
    }

    /// Accept connections until `shutdown` is cancelled. Each connection is
    /// served on its own task and dropped on shutdown.
    #[tracing::instrument(level = "info", skip_all, fields(addr = ?self.listener.local_addr().ok()))]
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        tracing::info!(source = self.source.uri(), "serving");
        loop {
            let (socket, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };
            tracing::debug!(%peer, "connection accepted");
            let connection = Connection {
                source: self.source.clone(),
                shutdown: shutdown.child_token(),
                heartbeat_interval: self.heartbeat_interval,
            };
            // detached; ends with the peer or on shutdown
            let _ = livecursor_common::spawn(async move {
                match connection.serve(socket).await {
                    Ok(()) => tracing::debug!(%peer, "connection finished"),
                    Err(e) => tracing::debug!(%peer, error = %e, "connection dropped"),
                }
            });
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

struct Connection {
    source: MemorySource,
    shutdown: CancellationToken,
    heartbeat_interval: Duration,
}

impl Connection {
    async fn serve(self, socket: TcpStream) -> Result<(), TransportError> {
        socket.set_nodelay(true)?;
        let mut socket = BufReader::new(socket);

        let parsed = wire::read_line(&mut socket, MAX_CONTROL_LINE_LEN)
            .await
            .and_then(|line| {
                let line = line.ok_or(TransportError::Closed)?;
                Ok(serde_json::from_str::<SubscribeRequest>(&line)?)
            });
        let request = match parsed {
            Ok(request) => request,
            Err(TransportError::Closed) => return Err(TransportError::Closed),
            Err(e) => {
                wire::write_line(&mut socket, &Handshake::error(e.error_code(), &e)).await?;
                return Err(e);
            }
        };
        // clients address the server, not the source behind it
        let request = SubscribeRequest {
            uri: self.source.uri().to_string(),
            ..request
        };
        tracing::debug!(filter = ?request.filter, replay = request.replay, "subscribe request");

        let mut frames = match self.source.subscribe(request).await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::info!(error = %e, "subscription refused");
                let refusal = match e {
                    TransportError::Rejected { code, message } => Handshake::error(code, message),
                    e => Handshake::error(e.error_code(), e),
                };
                wire::write_line(&mut socket, &refusal).await?;
                return Ok(());
            }
        };
        wire::write_line(&mut socket, &Handshake::Accepted { accepted: true }).await?;

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                frame = frames.next() => match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "source failed, dropping connection");
                        break;
                    }
                    None => break,
                },
                _ = heartbeat.tick() => Frame::Heartbeat,
            };
            let terminal = frame.is_terminal();
            let Some(line) = optify!(wire::encode_line(&frame), "failed to encode frame") else {
                continue;
            };
            socket.write_all(&line).await?;
            if terminal {
                break;
            }
        }
        socket.shutdown().await?;
        Ok(())
    }
}
