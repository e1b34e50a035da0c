use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

pin_project! {
    /// Stream wrapper that fires a cancellation token when dropped.
    ///
    /// hyper drops the response body when the caller disconnects, which is
    /// how a disconnect reaches the session reading the upstream.
    pub struct CancelOnDrop<S> {
        #[pin]
        inner: S,
        guard: DropGuard,
    }
}

impl<S> CancelOnDrop<S> {
    #[must_use]
    pub fn new(inner: S, cancel: CancellationToken) -> Self {
        Self {
            inner,
            guard: cancel.drop_guard(),
        }
    }
}

impl<S: Stream> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Receiving half of a session's outbound channel, as a body stream.
///
/// Ends when the session drops its sender.
pub struct OutboundChunks {
    receiver: mpsc::Receiver<Bytes>,
}

impl OutboundChunks {
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<Bytes>) -> Self {
        Self { receiver }
    }
}

impl Stream for OutboundChunks {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

/// Outbound body of one relay session.
pub type RelayBody = CancelOnDrop<OutboundChunks>;
