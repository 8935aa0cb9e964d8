//! The consumer side of a subscription.
//!
//! A [`RealtimeCursor`] alternates between an asynchronous wait for the next
//! batch and synchronous [`advance`](RealtimeCursor::advance) calls through
//! the rows of that batch:
//!
//! ```no_run
//! # async fn run(mut cursor: livecursor::RealtimeCursor) -> livecursor::Result<()> {
//! while cursor.wait_for_rows(None).await? {
//!     while cursor.advance()? {
//!         let row = cursor.current()?;
//!         println!("{} {:?}", row.origin(), row.record());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationController;
use crate::error::{CancelReason, CursorError, Result};
use futures::Stream;
use livecursor_common::time::{maybe_timeout, Duration};
use livecursor_proto::{Row, RowBatch};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorState {
    Open,
    Waiting,
    Ready,
    Closed,
    Cancelled,
    Faulted,
}

impl std::fmt::Display for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CursorState::Open => "open",
            CursorState::Waiting => "waiting",
            CursorState::Ready => "ready",
            CursorState::Closed => "closed",
            CursorState::Cancelled => "cancelled",
            CursorState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Counters kept by a cursor over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorStats {
    /// Non-empty batches received from the subscription
    pub batches_received: u64,
    pub rows_received: u64,
    /// Rows exposed through `advance`
    pub rows_delivered: u64,
}

/// What the subscription pump hands to the cursor.
#[derive(Debug)]
pub(crate) enum Delivery {
    Batch(RowBatch),
    Fault(String),
}

enum Outcome {
    Batch(RowBatch),
    Closed,
    Fault(String),
}

async fn next_delivery(rx: &mut mpsc::Receiver<Delivery>, shutdown: &CancellationToken) -> Outcome {
    loop {
        let delivery = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Outcome::Closed,
            delivery = rx.recv() => delivery,
        };
        match delivery {
            None => return Outcome::Closed,
            Some(Delivery::Batch(batch)) if batch.is_empty() => {
                tracing::trace!(sequence = batch.sequence(), "skipping empty batch");
            }
            Some(Delivery::Batch(batch)) => return Outcome::Batch(batch),
            Some(Delivery::Fault(reason)) => return Outcome::Fault(reason),
        }
    }
}

/// Single-consumer cursor over the live batches of one subscription.
pub struct RealtimeCursor {
    uri: String,
    state: CursorState,
    rx: mpsc::Receiver<Delivery>,
    pending: VecDeque<Row>,
    /// Batch picked up by `advance` while looking for a fault
    next_batch: Option<RowBatch>,
    current: Option<Row>,
    shutdown: CancellationToken,
    default_timeout: Option<Duration>,
    fault: Option<String>,
    /// Whether `false` was already returned for the close
    close_reported: bool,
    stats: CursorStats,
}

impl std::fmt::Debug for RealtimeCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeCursor")
            .field("uri", &self.uri)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl RealtimeCursor {
    pub(crate) fn new(
        uri: impl Into<String>,
        rx: mpsc::Receiver<Delivery>,
        shutdown: CancellationToken,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            uri: uri.into(),
            state: CursorState::Open,
            rx,
            pending: VecDeque::new(),
            next_batch: None,
            current: None,
            shutdown,
            default_timeout,
            fault: None,
            close_reported: false,
            stats: CursorStats::default(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn stats(&self) -> CursorStats {
        self.stats
    }

    /// Rows of the current batch not yet reached by `advance`.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Wait until rows are available.
    ///
    /// Returns `true` once at least one row can be read with
    /// [`advance`](Self::advance), immediately if unread rows remain. Returns
    /// `false` once when the subscription closes or the source ends. A
    /// `timeout` of `None` falls back to the configured default.
    pub async fn wait_for_rows(&mut self, timeout: Option<Duration>) -> Result<bool> {
        self.wait(timeout, None).await
    }

    /// Like [`wait_for_rows`](Self::wait_for_rows), but also fails with
    /// [`CursorError::Cancelled`] when `controller` is cancelled.
    pub async fn wait_for_rows_with(
        &mut self,
        timeout: Option<Duration>,
        controller: &CancellationController,
    ) -> Result<bool> {
        self.wait(timeout, Some(controller)).await
    }

    #[tracing::instrument(level = "debug", skip(self, controller), fields(uri = %self.uri))]
    async fn wait(
        &mut self,
        timeout: Option<Duration>,
        controller: Option<&CancellationController>,
    ) -> Result<bool> {
        self.observe_shutdown();
        match self.state {
            CursorState::Closed if !self.close_reported => {
                self.close_reported = true;
                return Ok(false);
            }
            CursorState::Closed => return Err(CursorError::invalid("wait for rows", self.state)),
            CursorState::Faulted => return Err(self.faulted()),
            _ => (),
        }
        self.current = None;
        if !self.pending.is_empty() {
            self.state = CursorState::Ready;
            return Ok(true);
        }
        if let Some(batch) = self.next_batch.take() {
            self.accept(batch);
            return Ok(true);
        }

        self.state = CursorState::Waiting;
        let timeout = timeout.or(self.default_timeout);
        let outcome = {
            let next = maybe_timeout(timeout, next_delivery(&mut self.rx, &self.shutdown));
            match controller {
                Some(controller) => tokio::select! {
                    biased;
                    _ = controller.cancelled() => Err(CancelReason::Requested),
                    res = next => res.map_err(|_| CancelReason::Timeout),
                },
                None => next.await.map_err(|_| CancelReason::Timeout),
            }
        };

        match outcome {
            Err(reason) => {
                tracing::debug!(%reason, "wait cancelled");
                self.state = CursorState::Cancelled;
                Err(CursorError::Cancelled(reason))
            }
            Ok(Outcome::Batch(batch)) => {
                self.accept(batch);
                Ok(true)
            }
            Ok(Outcome::Closed) => {
                tracing::debug!("subscription closed");
                self.release();
                self.state = CursorState::Closed;
                self.close_reported = true;
                Ok(false)
            }
            Ok(Outcome::Fault(reason)) => Err(self.fail(reason)),
        }
    }

    /// Move to the next row of the current batch. Never blocks.
    ///
    /// Returns `false` when the batch is exhausted; call
    /// [`wait_for_rows`](Self::wait_for_rows) for more. Fails once the
    /// subscription has closed or faulted, even with rows left unread.
    pub fn advance(&mut self) -> Result<bool> {
        self.observe_shutdown();
        match self.state {
            CursorState::Closed => return Err(CursorError::invalid("advance", self.state)),
            CursorState::Faulted => return Err(self.faulted()),
            _ => (),
        }
        if let Some(row) = self.pending.pop_front() {
            self.current = Some(row);
            self.stats.rows_delivered += 1;
            return Ok(true);
        }

        self.current = None;
        // a fault queued behind the drained batch surfaces here
        while self.next_batch.is_none() {
            match self.rx.try_recv() {
                Ok(Delivery::Batch(batch)) if batch.is_empty() => (),
                Ok(Delivery::Batch(batch)) => self.next_batch = Some(batch),
                Ok(Delivery::Fault(reason)) => return Err(self.fail(reason)),
                Err(_) => break,
            }
        }
        if self.state == CursorState::Ready {
            self.state = CursorState::Open;
        }
        Ok(false)
    }

    /// The row exposed by the last successful [`advance`](Self::advance).
    pub fn current(&self) -> Result<&Row> {
        self.current
            .as_ref()
            .ok_or(CursorError::invalid("read current row", self.state))
    }

    /// Take ownership of the current row. A second call fails until the next
    /// successful `advance`.
    pub fn take_current(&mut self) -> Result<Row> {
        self.current
            .take()
            .ok_or(CursorError::invalid("take current row", self.state))
    }

    /// Unsubscribe and drop any buffered rows. Closing twice does nothing.
    pub fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        tracing::debug!(uri = %self.uri, state = %self.state, "closing cursor");
        self.release();
        self.rx.close();
        self.shutdown.cancel();
        self.state = CursorState::Closed;
        self.close_reported = true;
    }

    /// Turn the cursor into a stream of rows that ends when the subscription
    /// closes. Errors end the stream after being yielded.
    pub fn into_row_stream(self) -> impl Stream<Item = Result<Row>> + Send {
        async_stream::try_stream! {
            let mut cursor = self;
            while cursor.wait_for_rows(None).await? {
                while cursor.advance()? {
                    yield cursor.take_current()?;
                }
            }
        }
    }

    fn accept(&mut self, batch: RowBatch) {
        tracing::debug!(sequence = batch.sequence(), rows = batch.len(), "batch ready");
        self.stats.batches_received += 1;
        self.stats.rows_received += batch.len() as u64;
        self.pending.extend(batch);
        self.state = CursorState::Ready;
    }

    fn fail(&mut self, reason: String) -> CursorError {
        tracing::warn!(uri = %self.uri, %reason, "subscription faulted");
        self.release();
        self.shutdown.cancel();
        self.fault = Some(reason);
        self.state = CursorState::Faulted;
        self.faulted()
    }

    /// A subscription closed from its own side drops rows the cursor still
    /// holds.
    fn observe_shutdown(&mut self) {
        if matches!(self.state, CursorState::Closed | CursorState::Faulted) {
            return;
        }
        if self.shutdown.is_cancelled() {
            tracing::debug!(uri = %self.uri, "subscription closed");
            self.release();
            self.state = CursorState::Closed;
        }
    }

    fn release(&mut self) {
        self.pending.clear();
        self.next_batch = None;
        self.current = None;
    }

    fn faulted(&self) -> CursorError {
        CursorError::Faulted {
            reason: self.fault.clone().unwrap_or_default(),
        }
    }
}

impl Drop for RealtimeCursor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use livecursor_common::time::Instant;
    use livecursor_proto::{Origin, Record};

    fn harness() -> (mpsc::Sender<Delivery>, CancellationToken, RealtimeCursor) {
        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let cursor = RealtimeCursor::new("memory://test", rx, shutdown.clone(), None);
        (tx, shutdown, cursor)
    }

    fn batch(sequence: u64, ids: &[i64]) -> Delivery {
        let records = ids.iter().map(|id| Record::new().with("id", *id)).collect();
        Delivery::Batch(RowBatch::tagged(sequence, Origin::Inserted, records))
    }

    fn id(row: &Row) -> i64 {
        row.get("id").and_then(|v| v.as_i64()).unwrap()
    }

    #[tokio::test]
    async fn rows_come_out_in_batch_order() {
        let (tx, _shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1, 2, 3])).await.unwrap();

        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert_eq!(cursor.state(), CursorState::Ready);
        let mut seen = vec![];
        while cursor.advance().unwrap() {
            seen.push(id(cursor.current().unwrap()));
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(cursor.state(), CursorState::Open);
        assert_eq!(cursor.stats().rows_delivered, 3);
    }

    #[tokio::test]
    async fn unread_rows_are_returned_without_waiting() {
        let (tx, _shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1, 2])).await.unwrap();
        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());

        assert!(cursor
            .wait_for_rows(Some(Duration::from_millis(1)))
            .await
            .unwrap());
        assert!(cursor.advance().unwrap());
        assert_eq!(id(cursor.current().unwrap()), 2);
    }

    #[tokio::test]
    async fn empty_batches_are_skipped() {
        let (tx, _shutdown, mut cursor) = harness();
        tx.send(batch(0, &[])).await.unwrap();
        tx.send(batch(1, &[7])).await.unwrap();

        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.stats().batches_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_without_losing_the_cursor() {
        let (tx, _shutdown, mut cursor) = harness();
        let start = Instant::now();
        let err = cursor
            .wait_for_rows(Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CursorError::Cancelled(CancelReason::Timeout)));
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(cursor.state(), CursorState::Cancelled);
        assert!(!cursor.advance().unwrap());

        tx.send(batch(0, &[1])).await.unwrap();
        assert!(cursor.wait_for_rows(None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_applies() {
        let (_tx, rx) = mpsc::channel(1);
        let mut cursor = RealtimeCursor::new(
            "memory://test",
            rx,
            CancellationToken::new(),
            Some(Duration::from_millis(500)),
        );
        let err = cursor.wait_for_rows(None).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn controller_cancels_wait() {
        let (tx, _shutdown, mut cursor) = harness();
        let controller = CancellationController::new();
        controller.cancel();
        tx.send(batch(0, &[1])).await.unwrap();

        let err = cursor
            .wait_for_rows_with(None, &controller)
            .await
            .unwrap_err();
        assert!(matches!(err, CursorError::Cancelled(CancelReason::Requested)));

        // the batch is still there for a fresh controller
        let fresh = CancellationController::new();
        assert!(cursor.wait_for_rows_with(None, &fresh).await.unwrap());
        assert!(cursor.advance().unwrap());
    }

    #[tokio::test]
    async fn controller_cancels_pending_wait() {
        let (_tx, _shutdown, mut cursor) = harness();
        let controller = CancellationController::new();
        let trigger = controller.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });
        let err = cursor
            .wait_for_rows_with(None, &controller)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn end_of_source_reports_false_once() {
        let (tx, _shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1])).await.unwrap();
        drop(tx);

        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());
        assert!(!cursor.advance().unwrap());
        assert!(!cursor.wait_for_rows(None).await.unwrap());
        assert_eq!(cursor.state(), CursorState::Closed);

        let err = cursor.wait_for_rows(None).await.unwrap_err();
        assert!(matches!(err, CursorError::InvalidState { state: CursorState::Closed, .. }));
        assert!(matches!(
            cursor.advance(),
            Err(CursorError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_discards_queued_batches() {
        let (tx, shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1])).await.unwrap();
        shutdown.cancel();
        assert!(!cursor.wait_for_rows(None).await.unwrap());
        assert_eq!(cursor.stats().rows_received, 0);
    }

    #[tokio::test]
    async fn fault_is_sticky() {
        let (tx, shutdown, mut cursor) = harness();
        tx.send(Delivery::Fault("connection reset".into()))
            .await
            .unwrap();

        let err = cursor.wait_for_rows(None).await.unwrap_err();
        assert!(matches!(err, CursorError::Faulted { ref reason } if reason == "connection reset"));
        assert!(shutdown.is_cancelled());
        assert!(cursor.advance().unwrap_err().is_faulted());
        assert!(cursor.wait_for_rows(None).await.unwrap_err().is_faulted());

        cursor.close();
        assert_eq!(cursor.state(), CursorState::Closed);
    }

    #[tokio::test]
    async fn current_requires_advance() {
        let (tx, _shutdown, mut cursor) = harness();
        assert!(matches!(
            cursor.current(),
            Err(CursorError::InvalidState { state: CursorState::Open, .. })
        ));

        tx.send(batch(0, &[5, 6])).await.unwrap();
        cursor.wait_for_rows(None).await.unwrap();
        assert!(cursor.current().is_err());
        assert!(cursor.advance().unwrap());
        assert_eq!(id(cursor.current().unwrap()), 5);

        // waiting again invalidates the current row even with rows left
        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(matches!(
            cursor.current(),
            Err(CursorError::InvalidState { state: CursorState::Ready, .. })
        ));
        assert!(cursor.advance().unwrap());
        let row = cursor.take_current().unwrap();
        assert_eq!(id(&row), 6);
        assert!(cursor.take_current().is_err());
    }

    #[tokio::test]
    async fn subscription_close_mid_batch_stops_rows() {
        let (tx, shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1, 2, 3])).await.unwrap();
        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());

        shutdown.cancel();
        assert!(!cursor.wait_for_rows(None).await.unwrap());
        assert_eq!(cursor.state(), CursorState::Closed);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.current().is_err());
        assert!(matches!(
            cursor.advance(),
            Err(CursorError::InvalidState { state: CursorState::Closed, .. })
        ));
        assert!(cursor.wait_for_rows(None).await.is_err());
    }

    #[tokio::test]
    async fn subscription_close_seen_by_advance_still_reports_false() {
        let (tx, shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1, 2])).await.unwrap();
        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());

        shutdown.cancel();
        assert!(matches!(
            cursor.advance(),
            Err(CursorError::InvalidState { state: CursorState::Closed, .. })
        ));
        assert!(!cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.wait_for_rows(None).await.is_err());
    }

    #[tokio::test]
    async fn fault_behind_drained_batch_surfaces_from_advance() {
        let (tx, shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1])).await.unwrap();
        tx.send(Delivery::Fault("connection closed by peer".into()))
            .await
            .unwrap();

        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());
        let err = cursor.advance().unwrap_err();
        assert!(matches!(err, CursorError::Faulted { ref reason } if reason.contains("closed")));
        assert_eq!(cursor.state(), CursorState::Faulted);
        assert!(shutdown.is_cancelled());
        assert!(cursor.wait_for_rows(None).await.unwrap_err().is_faulted());
    }

    #[tokio::test]
    async fn advance_keeps_the_next_batch_for_wait() {
        let (tx, _shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1])).await.unwrap();
        tx.send(batch(1, &[])).await.unwrap();
        tx.send(batch(2, &[2])).await.unwrap();

        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());
        assert!(!cursor.advance().unwrap());
        assert_eq!(cursor.state(), CursorState::Open);
        assert_eq!(cursor.stats().batches_received, 1);

        assert!(cursor.wait_for_rows(None).await.unwrap());
        assert!(cursor.advance().unwrap());
        assert_eq!(id(cursor.current().unwrap()), 2);
        assert_eq!(cursor.stats().batches_received, 2);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_unsubscribes() {
        let (tx, shutdown, mut cursor) = harness();
        tx.send(batch(0, &[1, 2])).await.unwrap();
        cursor.wait_for_rows(None).await.unwrap();

        cursor.close();
        cursor.close();
        assert!(shutdown.is_cancelled());
        assert_eq!(cursor.remaining(), 0);
        assert!(tx.send(batch(1, &[3])).await.is_err());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let (_tx, shutdown, cursor) = harness();
        drop(cursor);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn row_stream_ends_with_source() {
        let (tx, _shutdown, cursor) = harness();
        tx.send(batch(0, &[1, 2])).await.unwrap();
        tx.send(batch(1, &[3])).await.unwrap();
        drop(tx);

        let ids: Vec<i64> = cursor
            .into_row_stream()
            .map(|row| id(&row.unwrap()))
            .collect()
            .await;
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
