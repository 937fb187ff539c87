//! Request body accepted by the retry layer.
//!
//! `RetryBody` records *how* its bytes can be produced again, which is what
//! [`ReplaySource`](crate::http::replay::ReplaySource) needs to pick a replay
//! strategy without inspecting concrete reader types at runtime.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt};
use tokio::io::{AsyncRead, AsyncSeek};

use crate::BoxError;

/// Size of each chunk pulled from a seekable reader.
const READ_CHUNK: usize = 8 * 1024;

pub(crate) trait AsyncReadSeek: AsyncRead + AsyncSeek + Send {}

impl<T: AsyncRead + AsyncSeek + Send> AsyncReadSeek for T {}

/// A seekable reader shared by every view handed out for one request.
///
/// Each view remembers the generation it was created in; once a newer view
/// exists, older ones stop producing data.
pub(crate) struct ReaderState {
    pub(crate) reader: Pin<Box<dyn AsyncReadSeek>>,
    pub(crate) generation: u64,
}

pub(crate) type SharedReader = Arc<Mutex<ReaderState>>;

pub(crate) type ReplayFn = Arc<dyn Fn() -> io::Result<RetryBody> + Send + Sync>;

/// HTTP request body with a known replay capability.
pub struct RetryBody {
    kind: Kind,
}

pub(crate) enum Kind {
    Empty,
    Full(Option<Bytes>),
    Reader {
        reader: SharedReader,
        generation: u64,
        done: bool,
    },
    Replay { body: Box<RetryBody>, replay: ReplayFn },
    Stream(UnsyncBoxBody<Bytes, BoxError>),
}

impl RetryBody {
    /// A body with no content.
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A body that knows how to produce a fresh copy of itself.
    ///
    /// `body` is sent as-is when the request is not retried. When it is,
    /// every attempt, the first included, takes its body from `replay`,
    /// which must yield the same bytes each time.
    pub fn with_replay<F>(body: impl Into<RetryBody>, replay: F) -> Self
    where
        F: Fn() -> io::Result<RetryBody> + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Replay {
                body: Box::new(body.into()),
                replay: Arc::new(replay),
            },
        }
    }

    /// A body read from a seekable source, starting at its current position.
    ///
    /// Works with `tokio::fs::File` and `std::io::Cursor`.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + AsyncSeek + Send + 'static,
    {
        let state = ReaderState {
            reader: Box::pin(reader),
            generation: 0,
        };
        Self::reader_view(Arc::new(Mutex::new(state)), 0)
    }

    /// A forward-only streaming body.
    pub fn wrap<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            kind: Kind::Stream(body.map_err(Into::into).boxed_unsync()),
        }
    }

    pub(crate) fn reader_view(reader: SharedReader, generation: u64) -> Self {
        Self {
            kind: Kind::Reader {
                reader,
                generation,
                done: false,
            },
        }
    }

    pub(crate) fn into_kind(self) -> Kind {
        self.kind
    }

    pub(crate) fn from_kind(kind: Kind) -> Self {
        Self { kind }
    }
}

impl Default for RetryBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for RetryBody {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Full(Some(bytes)),
        }
    }
}

impl From<Vec<u8>> for RetryBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for RetryBody {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&'static str> for RetryBody {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl fmt::Debug for RetryBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Empty => "Empty",
            Kind::Full(_) => "Full",
            Kind::Reader { .. } => "Reader",
            Kind::Replay { .. } => "Replay",
            Kind::Stream(_) => "Stream",
        };
        f.debug_struct("RetryBody").field("kind", &kind).finish()
    }
}

impl Body for RetryBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(chunk) => Poll::Ready(
                chunk
                    .take()
                    .filter(|bytes| !bytes.is_empty())
                    .map(|bytes| Ok(Frame::data(bytes))),
            ),
            Kind::Reader {
                reader,
                generation,
                done,
            } => {
                if *done {
                    return Poll::Ready(None);
                }
                match ready!(poll_read_chunk(reader, *generation, cx)) {
                    Ok(Some(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                    Ok(None) => {
                        *done = true;
                        Poll::Ready(None)
                    }
                    Err(e) => {
                        *done = true;
                        Poll::Ready(Some(Err(e.into())))
                    }
                }
            }
            Kind::Replay { body, .. } => Pin::new(body.as_mut()).poll_frame(cx),
            Kind::Stream(stream) => Pin::new(stream).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(chunk) => chunk.as_ref().map_or(true, Bytes::is_empty),
            Kind::Reader { done, .. } => *done,
            Kind::Replay { body, .. } => body.is_end_stream(),
            Kind::Stream(stream) => stream.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Full(chunk) => {
                SizeHint::with_exact(chunk.as_ref().map_or(0, |bytes| bytes.len() as u64))
            }
            Kind::Reader { .. } => SizeHint::default(),
            Kind::Replay { body, .. } => body.size_hint(),
            Kind::Stream(stream) => stream.size_hint(),
        }
    }
}

fn poll_read_chunk(
    reader: &SharedReader,
    generation: u64,
    cx: &mut Context<'_>,
) -> Poll<io::Result<Option<Bytes>>> {
    let mut state = match reader.lock() {
        Ok(state) => state,
        Err(_) => return Poll::Ready(Err(poisoned())),
    };
    if state.generation != generation {
        return Poll::Ready(Err(io::Error::new(
            io::ErrorKind::Other,
            "body view superseded by a newer attempt",
        )));
    }
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    match ready!(tokio_util::io::poll_read_buf(Pin::new(&mut state.reader), cx, &mut buf)) {
        Ok(0) => Poll::Ready(Ok(None)),
        Ok(_) => Poll::Ready(Ok(Some(buf.freeze()))),
        Err(e) => Poll::Ready(Err(e)),
    }
}

pub(crate) fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "body reader lock poisoned")
}
