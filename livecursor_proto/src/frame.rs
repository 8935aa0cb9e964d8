//! Wire frames exchanged between a live source and a subscriber.

use crate::types::Record;
use serde::{Deserialize, Serialize};

/// What a subscriber asks a source for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Opaque address of the source
    pub uri: String,
    /// Predicate passed verbatim to the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Replay matching pre-existing records before live updates
    #[serde(default)]
    pub replay: bool,
}

impl SubscribeRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            filter: None,
            replay: false,
        }
    }

    pub fn filter(mut self, filter: Option<impl Into<String>>) -> Self {
        self.filter = filter.map(Into::into);
        self
    }

    pub fn replay(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }
}

/// One upstream event. Record frames carry untagged records; the subscription
/// turns them into tagged rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Records that existed before the subscription started
    Snapshot { records: Vec<Record> },
    Insert { records: Vec<Record> },
    Delete { records: Vec<Record> },
    /// Keep-alive with no data
    Heartbeat,
    /// The source failed and will not send anything else
    Fault { message: String },
    /// The source finished gracefully
    End,
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Snapshot { .. } => "snapshot",
            Frame::Insert { .. } => "insert",
            Frame::Delete { .. } => "delete",
            Frame::Heartbeat => "heartbeat",
            Frame::Fault { .. } => "fault",
            Frame::End => "end",
        }
    }

    /// Whether nothing may follow this frame.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Fault { .. } | Frame::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_by_kind() {
        let frame = Frame::Insert {
            records: vec![Record::new().with("type", "X")],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.starts_with(r#"{"kind":"insert""#));

        let hb: Frame = serde_json::from_str(r#"{"kind":"heartbeat"}"#).unwrap();
        assert_eq!(hb, Frame::Heartbeat);
        assert!(!hb.is_terminal());
        assert!(Frame::End.is_terminal());
    }

    #[test]
    fn request_defaults() {
        let req: SubscribeRequest = serde_json::from_str(r#"{"uri":"memory://a"}"#).unwrap();
        assert_eq!(req, SubscribeRequest::new("memory://a"));
        let req = SubscribeRequest::new("memory://a")
            .filter(Some("type = 'X'"))
            .replay(true);
        assert_eq!(req.filter.as_deref(), Some("type = 'X'"));
        assert!(req.replay);
    }
}
