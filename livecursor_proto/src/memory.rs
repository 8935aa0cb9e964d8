//! An in-process live source.
//!
//! [`MemorySource`] keeps a table of records and fans changes out to every
//! subscriber whose filter matches, in the order they are published. It backs
//! the NDJSON server and most tests.
//!
//! Each subscriber has a bounded queue. A subscriber that stops reading is
//! sent [`TransportError::Lagged`] and dropped once its queue fills up.

use crate::filter::AttributeFilter;
use crate::frame::{Frame, SubscribeRequest};
use crate::transport::{FrameStream, LiveTransport, TransportError};
use crate::types::Record;
use futures::StreamExt;
use livecursor_common::{ErrorCode, DEFAULT_SUBSCRIBER_BACKLOG};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

type FrameSender = mpsc::Sender<Result<Frame, TransportError>>;

struct Subscriber {
    filter: AttributeFilter,
    tx: FrameSender,
}

impl Subscriber {
    /// Queue `frame`. The last free slot is kept for a terminal frame or the
    /// lag error, so a subscriber always learns why it was dropped.
    /// Returns `false` once the subscriber is gone.
    fn send(&self, frame: Frame) -> bool {
        if frame.is_terminal() || self.tx.capacity() > 1 {
            return self.tx.try_send(Ok(frame)).is_ok();
        }
        if matches!(frame, Frame::Heartbeat) {
            return !self.tx.is_closed();
        }
        let backlog = self.tx.max_capacity();
        tracing::warn!(backlog, "subscriber fell behind, dropping it");
        let _ = self.tx.try_send(Err(TransportError::Lagged { backlog }));
        false
    }

    fn matching(&self, records: &[Record]) -> Vec<Record> {
        records
            .iter()
            .filter(|r| self.filter.matches(r))
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct State {
    table: Vec<Record>,
    subscribers: Vec<Subscriber>,
    unreachable: bool,
}

impl State {
    /// Send each subscriber its share of `records`, dropping subscribers that went away.
    fn fan_out(&mut self, records: &[Record], frame: fn(Vec<Record>) -> Frame) {
        self.subscribers.retain(|s| {
            let matching = s.matching(records);
            if matching.is_empty() {
                return !s.tx.is_closed();
            }
            s.send(frame(matching))
        });
    }

    fn broadcast(&mut self, frame: Frame) {
        self.subscribers.retain(|s| s.send(frame.clone()));
    }
}

/// A named live source living in this process. Cloning shares the source.
#[derive(Clone)]
pub struct MemorySource {
    uri: Arc<str>,
    backlog: usize,
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemorySource")
            .field("uri", &self.uri)
            .field("backlog", &self.backlog)
            .field("records", &state.table.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl MemorySource {
    pub fn new(uri: impl AsRef<str>) -> Self {
        Self {
            uri: Arc::from(uri.as_ref()),
            backlog: DEFAULT_SUBSCRIBER_BACKLOG,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Frames queued for each new subscriber before it is dropped as too
    /// slow. Raised to at least two.
    pub fn backlog(mut self, backlog: usize) -> Self {
        self.backlog = backlog.max(2);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Add records without notifying anyone. They are replayed to searches.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) {
        self.state.lock().table.extend(records);
    }

    /// Store `records` and publish them as inserts.
    pub fn insert(&self, records: Vec<Record>) {
        let mut state = self.state.lock();
        state.fan_out(&records, |records| Frame::Insert { records });
        state.table.extend(records);
    }

    /// Remove every stored record matching `filter` and publish them as deletes.
    /// Returns how many records were removed.
    pub fn delete_where(&self, filter: &AttributeFilter) -> usize {
        let mut state = self.state.lock();
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.table)
                .into_iter()
                .partition(|r| filter.matches(r));
        state.table = kept;
        if !removed.is_empty() {
            state.fan_out(&removed, |records| Frame::Delete { records });
        }
        removed.len()
    }

    pub fn heartbeat(&self) {
        self.state.lock().broadcast(Frame::Heartbeat);
    }

    /// Report an unrecoverable failure to every subscriber and drop them.
    pub fn fault(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        state.broadcast(Frame::Fault {
            message: message.into(),
        });
        state.subscribers.clear();
    }

    /// Simulate a dropped connection: subscribers see a transport error.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        for s in state.subscribers.drain(..) {
            let _ = s.tx.try_send(Err(TransportError::Closed));
        }
    }

    /// Finish every current subscription gracefully.
    pub fn end(&self) {
        let mut state = self.state.lock();
        state.broadcast(Frame::End);
        state.subscribers.clear();
    }

    /// While unreachable, new subscriptions fail to connect.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|s| !s.tx.is_closed());
        state.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl LiveTransport for MemorySource {
    #[tracing::instrument(level = "debug", skip(self), fields(source = %self.uri))]
    async fn subscribe(&self, request: SubscribeRequest) -> Result<FrameStream, TransportError> {
        if request.uri != *self.uri {
            return Err(TransportError::unreachable(request.uri, "no such source"));
        }
        let filter =
            AttributeFilter::from_option(request.filter.as_deref()).map_err(|e| {
                TransportError::Rejected {
                    code: e.error_code().to_string(),
                    message: e.to_string(),
                }
            })?;

        let mut state = self.state.lock();
        if state.unreachable {
            return Err(TransportError::unreachable(
                request.uri,
                "source is not accepting connections",
            ));
        }

        let (tx, rx) = mpsc::channel(self.backlog);
        let subscriber = Subscriber { filter, tx };
        // replay under the same lock so no live change can slip in between
        if request.replay {
            let existing = subscriber.matching(&state.table);
            tracing::debug!(count = existing.len(), "replaying pre-existing records");
            if !existing.is_empty() {
                subscriber.send(Frame::Snapshot { records: existing });
            }
        }
        state.subscribers.push(subscriber);
        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn kind(k: &str, id: i64) -> Record {
        Record::new().with("id", id).with("type", k)
    }

    #[tokio::test]
    async fn replay_precedes_live_inserts() {
        let source = MemorySource::new("memory://vehicles");
        source.seed(vec![kind("X", 1), kind("Y", 2), kind("X", 3)]);

        let mut stream = source
            .subscribe(
                SubscribeRequest::new("memory://vehicles")
                    .filter(Some("type = 'X'"))
                    .replay(true),
            )
            .await
            .unwrap();
        source.insert(vec![kind("Y", 4), kind("X", 5)]);

        match stream.next().await.unwrap().unwrap() {
            Frame::Snapshot { records } => assert_eq!(records, vec![kind("X", 1), kind("X", 3)]),
            other => panic!("unexpected {other:?}"),
        }
        match stream.next().await.unwrap().unwrap() {
            Frame::Insert { records } => assert_eq!(records, vec![kind("X", 5)]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(source.len(), 5);
    }

    #[tokio::test]
    async fn deletes_follow_inserts_in_order() {
        let source = MemorySource::new("memory://a");
        let mut stream = source
            .subscribe(SubscribeRequest::new("memory://a"))
            .await
            .unwrap();
        source.insert(vec![kind("X", 1)]);
        let removed = source.delete_where(&AttributeFilter::parse("id = 1").unwrap());
        assert_eq!(removed, 1);
        source.end();

        let frames: Vec<_> = stream.by_ref().map(|f| f.unwrap().name()).collect().await;
        assert_eq!(frames, vec!["insert", "delete", "end"]);
        assert!(source.is_empty());
    }

    #[tokio::test]
    async fn unknown_or_unreachable_sources_fail_to_connect() {
        let source = MemorySource::new("memory://a");
        let err = source
            .subscribe(SubscribeRequest::new("memory://b"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Unreachable { .. }));

        source.set_reachable(false);
        let err = source
            .subscribe(SubscribeRequest::new("memory://a"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn bad_filters_are_rejected() {
        let source = MemorySource::new("memory://a");
        let err = source
            .subscribe(SubscribeRequest::new("memory://a").filter(Some("type ==")))
            .await
            .err()
            .unwrap();
        assert!(
            matches!(err, TransportError::Rejected { ref code, .. } if code == "FilterError::Syntax")
        );
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let source = MemorySource::new("memory://a");
        let stream = source
            .subscribe(SubscribeRequest::new("memory://a"))
            .await
            .unwrap();
        assert_eq!(source.subscriber_count(), 1);
        drop(stream);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn interrupt_surfaces_transport_error() {
        let source = MemorySource::new("memory://a");
        let mut stream = source
            .subscribe(SubscribeRequest::new("memory://a"))
            .await
            .unwrap();
        source.interrupt();
        assert!(matches!(
            stream.next().await,
            Some(Err(TransportError::Closed))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn slow_subscribers_are_dropped_with_lag_error() {
        let source = MemorySource::new("memory://a").backlog(3);
        let mut stream = source
            .subscribe(SubscribeRequest::new("memory://a"))
            .await
            .unwrap();
        for id in 0..5 {
            source.insert(vec![kind("X", id)]);
        }
        source.heartbeat();
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(source.len(), 5);

        let frames: Vec<_> = stream.by_ref().collect().await;
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Ok(Frame::Insert { .. })));
        assert!(matches!(frames[1], Ok(Frame::Insert { .. })));
        assert!(matches!(
            frames[2],
            Err(TransportError::Lagged { backlog: 3 })
        ));
    }

    #[tokio::test]
    async fn heartbeats_do_not_fill_the_queue() {
        let source = MemorySource::new("memory://a").backlog(2);
        let mut stream = source
            .subscribe(SubscribeRequest::new("memory://a"))
            .await
            .unwrap();
        source.heartbeat();
        source.heartbeat();
        source.heartbeat();
        assert_eq!(source.subscriber_count(), 1);
        source.end();

        let frames: Vec<_> = stream.by_ref().map(|f| f.unwrap().name()).collect().await;
        assert_eq!(frames, vec!["heartbeat", "end"]);
    }
}
