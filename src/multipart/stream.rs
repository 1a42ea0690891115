//! Prefix-restoring stream decorator.
//!
//! Sampling takes bytes off the front of a live stream. `PrefixedStream`
//! hands them back: it yields the sampled prefix exactly once, then
//! delegates to the remainder of the stream, so the consumer sees the
//! original byte sequence.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};

use crate::multipart::error::MultipartError;

/// Yields `prefix`, then the items of `inner` (if any).
pub struct PrefixedStream<S> {
    prefix: Option<Bytes>,
    inner: Option<S>,
}

/// The accepted file as delivered to callers.
pub type FileStream = PrefixedStream<BoxStream<'static, Result<Bytes, MultipartError>>>;

impl<S> PrefixedStream<S> {
    /// Prefix followed by the live remainder.
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self {
            prefix: Some(prefix),
            inner: Some(inner),
        }
    }

    /// Finite stream made of `prefix` alone.
    pub fn replay(prefix: Bytes) -> Self {
        Self {
            prefix: Some(prefix),
            inner: None,
        }
    }

    /// True while a remainder is still attached.
    pub fn is_live(&self) -> bool {
        self.inner.is_some()
    }
}

impl<S, E> PrefixedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    /// Drain into one buffer. Only for callers that can afford it.
    pub async fn collect_bytes(mut self) -> Result<Bytes, E> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl<S, E> Stream for PrefixedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(prefix) = self.prefix.take() {
            if !prefix.is_empty() {
                return Poll::Ready(Some(Ok(prefix)));
            }
        }

        match self.inner.as_mut() {
            Some(inner) => {
                let next = inner.poll_next_unpin(cx);
                if let Poll::Ready(None) = next {
                    self.inner = None;
                }
                next
            }
            None => Poll::Ready(None),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let prefix = usize::from(self.prefix.as_ref().is_some_and(|p| !p.is_empty()));
        match &self.inner {
            Some(inner) => {
                let (lower, upper) = inner.size_hint();
                (lower + prefix, upper.map(|u| u + prefix))
            }
            None => (prefix, Some(prefix)),
        }
    }
}

impl<S> std::fmt::Debug for PrefixedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedStream")
            .field("prefix_len", &self.prefix.as_ref().map(Bytes::len))
            .field("live", &self.inner.is_some())
            .finish()
    }
}
