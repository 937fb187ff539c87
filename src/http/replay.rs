//! Body replay for retried requests.
//!
//! # Responsibilities
//! - Decide once per call how the request body can be re-supplied
//! - Hand out a fresh, rewound body for every attempt
//! - Report when no replay is possible so the caller sends a single attempt
//!
//! # Resolution Order
//! ```text
//! RetryBody
//!     → Empty / Full            replay from memory (cheap Bytes clone)
//!     → with_replay(factory)    delegate to the factory
//!     → from_reader(seekable)   capture offset once, seek back per attempt
//!     → wrap(stream)            buffer eagerly, bounded by the buffer limit
//!     → otherwise               Unreplayable, body handed back for one send
//! ```
//!
//! A stream that outgrows the buffer limit while being read is also
//! unreplayable: the bytes read so far are put back in front of the rest of
//! the stream, so the single attempt still sends the complete body.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::ready;

use bytes::{Bytes, BytesMut};
use futures_util::{future, stream, StreamExt};
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, BodyStream, StreamBody};
use thiserror::Error;
use tokio::io::AsyncSeek;

use crate::http::body::{poisoned, Kind, ReplayFn, RetryBody, SharedReader};
use crate::BoxError;

/// Error source shared between repeated `obtain()` calls.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Failure to re-supply the request body for an attempt.
#[derive(Debug, Clone, Error)]
pub enum ReplayError {
    /// Reading the original body into memory failed.
    #[error("buffering request body failed: {0}")]
    Buffer(#[source] SharedError),

    /// Seeking back to the captured offset failed.
    #[error("rewinding request body failed: {0}")]
    Seek(#[source] SharedError),

    /// The body's own replay factory failed.
    #[error("replay factory failed: {0}")]
    Factory(#[source] SharedError),

    /// A previous reader panicked while holding the shared body.
    #[error("request body reader poisoned")]
    ReaderPoisoned,
}

/// Outcome of [`ReplaySource::resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// The body can be re-supplied for every attempt.
    Replayable(ReplaySource),
    /// No replay route applies; the untouched body is returned for a single attempt.
    Unreplayable(RetryBody),
}

/// Produces an independent copy of the original request body per attempt.
pub struct ReplaySource {
    source: Source,
}

enum Source {
    Empty,
    Memory(Bytes),
    Native(ReplayFn),
    Seek { reader: SharedReader, offset: u64 },
    Failed(ReplayError),
}

impl ReplaySource {
    /// Pick a replay route for `body`.
    ///
    /// Streaming bodies are buffered only when `buffer_limit > 0` and their
    /// size hint fits within it. A stream that fails while being buffered
    /// yields a source whose every `obtain()` returns the error.
    pub async fn resolve(body: RetryBody, buffer_limit: usize) -> Resolution {
        let source = match body.into_kind() {
            Kind::Empty | Kind::Full(None) => Source::Empty,
            Kind::Full(Some(bytes)) => Source::Memory(bytes),
            Kind::Replay { replay, .. } => Source::Native(replay),
            Kind::Reader {
                reader,
                generation,
                done,
            } => match seek(&reader, SeekFrom::Current(0)).await {
                Ok(offset) => Source::Seek { reader, offset },
                Err(e) => {
                    tracing::debug!(error = %e, "Body is not seekable, disabling retry");
                    return Resolution::Unreplayable(RetryBody::from_kind(Kind::Reader {
                        reader,
                        generation,
                        done,
                    }));
                }
            },
            Kind::Stream(stream) => {
                let hint = stream.size_hint();
                let too_large = hint.lower() > buffer_limit as u64
                    || hint.upper().is_some_and(|upper| upper > buffer_limit as u64);
                if buffer_limit == 0 || too_large {
                    tracing::debug!(
                        buffer_limit,
                        size_hint = ?hint.upper(),
                        "Streaming body cannot be buffered, disabling retry"
                    );
                    return Resolution::Unreplayable(RetryBody::from_kind(Kind::Stream(stream)));
                }
                match buffer(stream, buffer_limit).await {
                    Buffered::Complete(bytes) => Source::Memory(bytes),
                    Buffered::Failed(e) => Source::Failed(ReplayError::Buffer(Arc::from(e))),
                    Buffered::Overflow(body) => {
                        tracing::debug!(
                            buffer_limit,
                            "Streaming body outgrew the buffer limit, disabling retry"
                        );
                        return Resolution::Unreplayable(body);
                    }
                }
            }
        };
        Resolution::Replayable(Self { source })
    }

    /// A fresh body positioned at the start of the original content.
    pub async fn obtain(&self) -> Result<RetryBody, ReplayError> {
        match &self.source {
            Source::Empty => Ok(RetryBody::empty()),
            Source::Memory(bytes) => Ok(RetryBody::from(bytes.clone())),
            Source::Native(replay) => replay().map_err(|e| ReplayError::Factory(Arc::new(e))),
            Source::Seek { reader, offset } => {
                let generation = {
                    let mut state = reader.lock().map_err(|_| ReplayError::ReaderPoisoned)?;
                    state.generation += 1;
                    state.generation
                };
                seek(reader, SeekFrom::Start(*offset))
                    .await
                    .map_err(|e| ReplayError::Seek(Arc::new(e)))?;
                Ok(RetryBody::reader_view(reader.clone(), generation))
            }
            Source::Failed(err) => Err(err.clone()),
        }
    }
}

impl std::fmt::Debug for ReplaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let route = match &self.source {
            Source::Empty => "empty",
            Source::Memory(_) => "memory",
            Source::Native(_) => "native",
            Source::Seek { .. } => "seek",
            Source::Failed(_) => "failed",
        };
        f.debug_struct("ReplaySource").field("route", &route).finish()
    }
}

/// Seek the shared reader, waiting out any operation a previous view left pending.
async fn seek(reader: &SharedReader, pos: SeekFrom) -> io::Result<u64> {
    let mut started = false;
    future::poll_fn(|cx| {
        let mut state = reader.lock().map_err(|_| poisoned())?;
        if !started {
            ready!(Pin::new(&mut state.reader).poll_complete(cx))?;
            Pin::new(&mut state.reader).start_seek(pos)?;
            started = true;
        }
        Pin::new(&mut state.reader).poll_complete(cx)
    })
    .await
}

enum Buffered {
    Complete(Bytes),
    Failed(BoxError),
    /// Read prefix chained in front of the unread remainder.
    Overflow(RetryBody),
}

async fn buffer(mut body: UnsyncBoxBody<Bytes, BoxError>, limit: usize) -> Buffered {
    let mut buffered = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => return Buffered::Failed(e),
        };
        // Trailers are not replayed.
        let Ok(data) = frame.into_data() else {
            continue;
        };
        buffered.extend_from_slice(&data);
        if buffered.len() > limit {
            let prefix = stream::iter([Ok(Frame::data(buffered.freeze()))]);
            let rest = StreamBody::new(prefix.chain(BodyStream::new(body)));
            return Buffered::Overflow(RetryBody::wrap(rest));
        }
    }
    Buffered::Complete(buffered.freeze())
}
