//! Line framing shared by the client and the server.
//!
//! A connection carries one JSON value per line:
//! 1. the client sends a [`SubscribeRequest`](livecursor_proto::SubscribeRequest)
//! 2. the server answers with a [`Handshake`]
//! 3. the server streams [`Frame`]s until a terminal frame or disconnect

use futures::{Stream, StreamExt};
use livecursor_proto::{Frame, TransportError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

const READ_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Handshake {
    Err(ErrorResponse),
    Accepted { accepted: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl Handshake {
    pub(crate) fn error(code: impl Into<String>, message: impl ToString) -> Self {
        Self::Err(ErrorResponse {
            code: code.into(),
            message: message.to_string(),
        })
    }
}

pub(crate) fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

pub(crate) async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(value)?;
    writer.write_all(&line).await?;
    Ok(())
}

/// Read one line of at most `limit` bytes. `None` at end of input.
pub(crate) async fn read_line<R>(reader: &mut R, limit: usize) -> Result<Option<String>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_line(&mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if read > limit && !line.ends_with('\n') {
        return Err(TransportError::Oversized { limit });
    }
    Ok(Some(line))
}

/// Decode frames from `reader`, one per line.
///
/// Lines longer than `max_len` bytes fail with [`TransportError::Oversized`].
/// Reaching end of input, even in the middle of a line, yields
/// [`TransportError::Closed`]. Nothing is yielded after an error.
pub(crate) fn decode_frames<R>(
    reader: R,
    max_len: usize,
) -> impl Stream<Item = Result<Frame, TransportError>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let codec = LinesCodec::new_with_max_length(max_len);
    let mut lines = FramedRead::with_capacity(reader, codec, READ_CAPACITY);
    async_stream::stream! {
        while let Some(line) = lines.next().await {
            let frame = match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_frame(&line),
                Err(e) => Err(line_error(e, max_len)),
            };
            let failed = frame.is_err();
            yield frame;
            if failed {
                return;
            }
        }
        yield Err(TransportError::Closed);
    }
}

fn parse_frame(line: &str) -> Result<Frame, TransportError> {
    serde_json::from_str(line).map_err(|e| {
        // a line cut short at end of input
        if e.is_eof() {
            TransportError::Closed
        } else {
            TransportError::Decode(e)
        }
    })
}

fn line_error(e: LinesCodecError, limit: usize) -> TransportError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => TransportError::Oversized { limit },
        LinesCodecError::Io(e) => TransportError::Io(e),
    }
}
