//! Binds a cursor to a live source.
//!
//! Opening a subscription asks the transport for a frame stream and spawns a
//! pump task that turns frames into tagged [`RowBatch`]es. The pump and the
//! cursor share a cancellation token: whichever side shuts down first stops
//! the other.

use crate::config::SubscriptionConfig;
use crate::cursor::{CursorState, Delivery, RealtimeCursor};
use crate::error::{CursorError, Result};
use futures::StreamExt;
use livecursor_common::{StreamHandle, TokioStreamHandle};
use livecursor_proto::{Frame, FrameStream, LiveTransport, Origin, RowBatch, SubscribeRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One subscription to one source, feeding at most one cursor.
pub struct Subscription<T> {
    transport: T,
    uri: String,
    config: SubscriptionConfig,
    shutdown: CancellationToken,
    opened: AtomicBool,
    closed: AtomicBool,
    pump: Mutex<Option<TokioStreamHandle<PumpSummary>>>,
}

/// What the pump did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpSummary {
    pub batches: u64,
    pub rows: u64,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("uri", &self.uri)
            .field("config", &self.config)
            .field("opened", &self.opened.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("pump_running", &self.pump_running())
            .finish()
    }
}

impl<T> Subscription<T>
where
    T: LiveTransport,
{
    pub fn new(transport: T, uri: impl Into<String>, config: SubscriptionConfig) -> Self {
        Self {
            transport,
            uri: uri.into(),
            config,
            shutdown: CancellationToken::new(),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }

    /// Connect to the source and return the cursor fed by it.
    ///
    /// `filter` is passed to the source verbatim. A subscription feeds a
    /// single cursor, so opening twice fails with
    /// [`CursorError::InvalidState`]. A failed connection can be retried.
    #[tracing::instrument(level = "debug", skip(self), fields(uri = %self.uri))]
    pub async fn open(&self, filter: Option<&str>) -> Result<RealtimeCursor> {
        if self.is_closed() {
            return Err(CursorError::invalid("open subscription", CursorState::Closed));
        }
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(CursorError::invalid("open subscription", CursorState::Open));
        }

        let request = SubscribeRequest::new(&self.uri)
            .filter(filter)
            .replay(self.config.replay);
        let frames = match self.transport.subscribe(request).await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "failed to connect");
                self.opened.store(false, Ordering::SeqCst);
                return Err(CursorError::Connection(e));
            }
        };

        let shutdown = self.shutdown.child_token();
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        let handle = livecursor_common::spawn(pump(
            self.uri.clone(),
            frames,
            tx,
            shutdown.clone(),
        ));
        *self.pump.lock() = Some(handle);
        // close may have raced with the connection
        if self.is_closed() {
            shutdown.cancel();
        }

        tracing::info!("subscription open");
        Ok(RealtimeCursor::new(
            self.uri.clone(),
            rx,
            shutdown,
            self.config.default_wait_timeout,
        ))
    }
}

impl<T> Subscription<T> {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether a pump task was spawned and has not stopped yet.
    pub fn pump_running(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .is_some_and(|h| !h.abort_handle().is_finished())
    }

    /// Tear the connection down. A pending wait on the cursor resolves to
    /// `false`; undelivered batches are dropped. Closing twice does nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(uri = %self.uri, "closing subscription");
        self.shutdown.cancel();
    }

    /// Close and wait for the pump task to stop. Returns `None` if the
    /// subscription was never opened or the pump was already awaited.
    pub async fn close_and_wait(&self) -> Option<PumpSummary> {
        self.close();
        let handle = self.pump.lock().take()?;
        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(uri = %self.uri, error = %e, "pump did not finish cleanly");
                None
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
        if let Some(handle) = self.pump.get_mut().take() {
            handle.end();
        }
    }
}

enum Step {
    Deliver(Delivery),
    Skip,
    Stop,
}

/// Tags record frames with their origin. A snapshot is only valid before the
/// first live batch.
fn step(uri: &str, frame: Frame, sequence: &mut u64, live: &mut bool) -> Step {
    let (origin, records) = match frame {
        Frame::Snapshot { .. } if *live => {
            tracing::warn!(uri, "snapshot after live data");
            return Step::Deliver(Delivery::Fault(
                "snapshot received after live data".to_string(),
            ));
        }
        Frame::Snapshot { records } => (Origin::PreExisting, records),
        Frame::Insert { records } => (Origin::Inserted, records),
        Frame::Delete { records } => (Origin::Deleted, records),
        Frame::Heartbeat => {
            tracing::trace!(uri, "heartbeat");
            return Step::Skip;
        }
        Frame::Fault { message } => {
            tracing::warn!(uri, %message, "source faulted");
            return Step::Deliver(Delivery::Fault(message));
        }
        Frame::End => {
            tracing::debug!(uri, "source ended");
            return Step::Stop;
        }
    };
    if records.is_empty() {
        return Step::Skip;
    }
    if origin != Origin::PreExisting {
        *live = true;
    }
    let batch = RowBatch::tagged(*sequence, origin, records);
    *sequence += 1;
    Step::Deliver(Delivery::Batch(batch))
}

/// Reads frames until the source ends, faults or the subscription shuts down.
async fn pump(
    uri: String,
    mut frames: FrameStream,
    tx: mpsc::Sender<Delivery>,
    shutdown: CancellationToken,
) -> PumpSummary {
    let mut summary = PumpSummary::default();
    let mut sequence = 0u64;
    let mut live = false;

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = frames.next() => frame,
        };

        let delivery = match frame {
            None => {
                tracing::debug!(%uri, "frame stream ended");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(%uri, error = %e, "transport failed");
                Delivery::Fault(e.to_string())
            }
            Some(Ok(frame)) => match step(&uri, frame, &mut sequence, &mut live) {
                Step::Deliver(delivery) => delivery,
                Step::Skip => continue,
                Step::Stop => break,
            },
        };
        if let Delivery::Batch(batch) = &delivery {
            summary.batches += 1;
            summary.rows += batch.len() as u64;
            tracing::trace!(%uri, sequence = batch.sequence(), rows = batch.len(), "forwarding batch");
        }

        let terminal = matches!(delivery, Delivery::Fault(_));
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            sent = tx.send(delivery) => if sent.is_err() {
                tracing::debug!(%uri, "cursor dropped");
                break;
            },
        }
        if terminal {
            break;
        }
    }
    summary
}
