//! Request body sources.
//!
//! An exchange sends exactly one body, picked by precedence from the
//! request options: an in-memory buffer, then a byte stream, then an
//! [`ExternalWrite`] strategy, then nothing.

use crate::base::neterror::NetError;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{SinkExt, Stream, TryStreamExt};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The body type every pooled connection is handshaken with.
pub type ExchangeBody = UnsyncBoxBody<Bytes, BoxError>;

/// A readable byte source for a request body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Chunks buffered between an external writer and the connection.
const WRITER_CHANNEL_CAPACITY: usize = 16;

/// A byte stream that can sit in cloneable options.
///
/// The first exchange to send it takes it; it cannot be replayed.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<Option<ByteStream>>>,
}

impl SharedStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::pin(stream)))),
        }
    }

    pub(crate) fn take(&self) -> Option<ByteStream> {
        match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// True once an exchange has taken the stream.
    pub fn is_consumed(&self) -> bool {
        match self.inner.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStream")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Caller-supplied strategy that writes a request body.
///
/// The strategy receives a [`BodyWriter`] and writes chunks through it. The
/// body ends when the writer is dropped or [`finish`](BodyWriter::finish)ed.
/// Returning an error settles the exchange with that error; returning `Ok`
/// leaves settlement to the response.
pub trait ExternalWrite: Send + Sync {
    fn write(&self, writer: BodyWriter) -> BoxFuture<'static, Result<(), NetError>>;
}

impl<F, Fut> ExternalWrite for F
where
    F: Fn(BodyWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), NetError>> + Send + 'static,
{
    fn write(&self, writer: BodyWriter) -> BoxFuture<'static, Result<(), NetError>> {
        Box::pin(self(writer))
    }
}

/// Write half of a request body handed to an [`ExternalWrite`] strategy.
pub struct BodyWriter {
    tx: mpsc::Sender<Result<Frame<Bytes>, BoxError>>,
    written: u64,
}

impl BodyWriter {
    fn channel() -> (Self, ExchangeBody) {
        let (tx, rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let body = StreamBody::new(rx).boxed_unsync();
        (Self { tx, written: 0 }, body)
    }

    /// Queue one chunk. Fails once the request has been torn down.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), NetError> {
        let chunk = chunk.into();
        let len = chunk.len() as u64;
        self.tx
            .send(Ok(Frame::data(chunk)))
            .await
            .map_err(|_| NetError::ConnectionClosed)?;
        self.written += len;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// End the body.
    pub fn finish(self) {}
}

impl fmt::Debug for BodyWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyWriter")
            .field("written", &self.written)
            .finish()
    }
}

/// The body an exchange will send, resolved by precedence.
#[derive(Clone)]
pub enum BodySource {
    Buffer(Bytes),
    Stream(SharedStream),
    External(Arc<dyn ExternalWrite>),
    Empty,
}

/// An external strategy together with the writer it must be driven with.
pub(crate) type PendingWrite = (Arc<dyn ExternalWrite>, BodyWriter);

impl BodySource {
    pub fn kind(&self) -> &'static str {
        match self {
            BodySource::Buffer(_) => "buffer",
            BodySource::Stream(_) => "stream",
            BodySource::External(_) => "external",
            BodySource::Empty => "empty",
        }
    }

    /// Build the hyper body, plus the writer an external strategy needs.
    pub(crate) fn into_body(self) -> (ExchangeBody, Option<PendingWrite>) {
        match self {
            BodySource::Buffer(bytes) => (full(bytes), None),
            BodySource::Stream(shared) => match shared.take() {
                Some(stream) => {
                    let frames = stream
                        .map_ok(Frame::data)
                        .map_err(|e| -> BoxError { Box::new(e) });
                    (StreamBody::new(frames).boxed_unsync(), None)
                }
                None => {
                    tracing::warn!("request stream already consumed, sending empty body");
                    (empty(), None)
                }
            },
            BodySource::External(strategy) => {
                let (writer, body) = BodyWriter::channel();
                (body, Some((strategy, writer)))
            }
            BodySource::Empty => (empty(), None),
        }
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            BodySource::Stream(s) => f.debug_tuple("Stream").field(s).finish(),
            BodySource::External(_) => f.write_str("External"),
            BodySource::Empty => f.write_str("Empty"),
        }
    }
}

fn full(bytes: Bytes) -> ExchangeBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

fn empty() -> ExchangeBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}
