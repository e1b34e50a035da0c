//! Per-request token relay.
//!
//! A [`RelaySession`] owns the upstream byte stream, its decoder and the
//! sending half of the outbound channel. The matching [`RelayBody`] owns the
//! receiving half. Token text is written in decode order; the outbound
//! stream closes exactly once, when the session drops its sender.
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::body::{CancelOnDrop, OutboundChunks, RelayBody};
use super::decoder::frame_stream;
use super::{Dialect, UpstreamFrame};
use crate::error::RelayError;

const MALFORMED_PREVIEW_CHARS: usize = 120;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream reached EOF without a sentinel.
    Completed,
    /// Upstream sent its terminal sentinel.
    Terminated,
    /// Upstream read failed mid-stream.
    Interrupted,
    /// Caller went away or the token was cancelled.
    Cancelled,
}

impl RelayOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::Terminated => "terminated",
            RelayOutcome::Interrupted => "interrupted",
            RelayOutcome::Cancelled => "cancelled",
        }
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub tokens: u64,
    pub bytes: u64,
    pub malformed: u64,
}

pub struct RelaySession {
    frames: BoxStream<'static, Result<UpstreamFrame, RelayError>>,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    stats: RelayStats,
}

impl RelaySession {
    /// Bind an upstream byte stream to a new outbound body.
    ///
    /// `buffer_frames` bounds how many token writes may wait for the caller.
    /// Dropping the returned body cancels `cancel`.
    pub fn open<S, E>(
        upstream: S,
        dialect: Dialect,
        buffer_frames: usize,
        cancel: CancellationToken,
    ) -> (Self, RelayBody)
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let (outbound, receiver) = mpsc::channel(buffer_frames.max(1));
        let body = CancelOnDrop::new(OutboundChunks::new(receiver), cancel.clone());
        let session = Self {
            frames: frame_stream(upstream, dialect).boxed(),
            outbound,
            cancel,
            stats: RelayStats::default(),
        };
        (session, body)
    }

    /// Pump frames until the upstream ends, the sentinel arrives, a read
    /// fails, or the session is cancelled.
    ///
    /// Both waits (next upstream chunk, outbound capacity) observe the
    /// cancellation token.
    pub async fn run(self) -> (RelayOutcome, RelayStats) {
        let Self {
            mut frames,
            outbound,
            cancel,
            mut stats,
        } = self;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break RelayOutcome::Cancelled,
                next = frames.next() => next,
            };

            match next {
                None => break RelayOutcome::Completed,
                Some(Ok(UpstreamFrame::Terminal)) => break RelayOutcome::Terminated,
                Some(Ok(UpstreamFrame::Malformed { raw, error })) => {
                    stats.malformed += 1;
                    let err = RelayError::FrameParse(error);
                    tracing::warn!(
                        error = %err,
                        line = %preview(&raw),
                        "dropping upstream line"
                    );
                }
                Some(Ok(UpstreamFrame::Token(text))) => {
                    let len = text.len() as u64;
                    let sent = tokio::select! {
                        biased;
                        () = cancel.cancelled() => false,
                        sent = outbound.send(Bytes::from(text)) => sent.is_ok(),
                    };
                    if !sent {
                        break RelayOutcome::Cancelled;
                    }
                    stats.tokens += 1;
                    stats.bytes += len;
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "upstream stream failed, closing response");
                    break RelayOutcome::Interrupted;
                }
            }
        };

        // Release the upstream connection, then close the outbound stream.
        drop(frames);
        drop(outbound);
        (outcome, stats)
    }
}

fn preview(raw: &str) -> &str {
    raw.char_indices()
        .nth(MALFORMED_PREVIEW_CHARS)
        .map_or(raw, |(idx, _)| &raw[..idx])
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        futures_util::stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect_body(mut body: RelayBody) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_ndjson_relay_completes_at_eof() {
        let upstream = chunks(&[
            "{\"message\":{\"content\":\"Hel\"}}\n{\"mess",
            "age\":{\"content\":\"lo\"}}\nnot-json\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
        ]);
        let (session, body) =
            RelaySession::open(upstream, Dialect::LineJson, 4, CancellationToken::new());
        let task = tokio::spawn(session.run());

        assert_eq!(collect_body(body).await, "Hello");
        let (outcome, stats) = task.await.unwrap();
        assert_eq!(outcome, RelayOutcome::Completed);
        assert_eq!(
            stats,
            RelayStats {
                tokens: 2,
                bytes: 5,
                malformed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_sse_relay_stops_at_sentinel() {
        let upstream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"yo\"}}]}\n\n",
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ]);
        let (session, body) =
            RelaySession::open(upstream, Dialect::Sse, 4, CancellationToken::new());
        let task = tokio::spawn(session.run());

        assert_eq!(collect_body(body).await, "yo");
        let (outcome, _) = task.await.unwrap();
        assert_eq!(outcome, RelayOutcome::Terminated);
    }

    #[tokio::test]
    async fn test_read_error_after_open_closes_cleanly() {
        let upstream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"message\":{\"content\":\"part\"}}\n")),
            Err("connection reset by peer"),
        ]);
        let (session, body) =
            RelaySession::open(upstream, Dialect::LineJson, 4, CancellationToken::new());
        let task = tokio::spawn(session.run());

        assert_eq!(collect_body(body).await, "part");
        let (outcome, stats) = task.await.unwrap();
        assert_eq!(outcome, RelayOutcome::Interrupted);
        assert_eq!(stats.tokens, 1);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Wrap `inner` so `released` flips when the upstream stream is dropped.
    fn tracked<S>(inner: S, released: &Arc<AtomicBool>) -> impl Stream<Item = S::Item> + Send
    where
        S: Stream + Unpin + Send + 'static,
        S::Item: Send,
    {
        let guard = DropFlag(Arc::clone(released));
        futures_util::stream::unfold((inner, guard), |(mut inner, guard)| async move {
            let item = inner.next().await?;
            Some((item, (inner, guard)))
        })
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_on_upstream() {
        let released = Arc::new(AtomicBool::new(false));
        let upstream = tracked(
            chunks(&["{\"message\":{\"content\":\"first\"}}\n"])
                .chain(futures_util::stream::pending()),
            &released,
        );
        let cancel = CancellationToken::new();
        let (session, mut body) = RelaySession::open(upstream, Dialect::LineJson, 4, cancel.clone());
        let task = tokio::spawn(session.run());

        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"first"));
        assert!(!released.load(Ordering::SeqCst));

        cancel.cancel();
        let (outcome, stats) = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session must stop promptly")
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert_eq!(stats.tokens, 1);
        assert!(released.load(Ordering::SeqCst), "upstream stream must be dropped");
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_body_cancels_session_blocked_on_write() {
        // Endless upstream: the session only stops because the caller left.
        let released = Arc::new(AtomicBool::new(false));
        let upstream = tracked(
            futures_util::stream::repeat_with(|| {
                Ok::<_, Infallible>(Bytes::from_static(b"{\"message\":{\"content\":\"x\"}}\n"))
            }),
            &released,
        );
        let cancel = CancellationToken::new();
        let (session, body) = RelaySession::open(upstream, Dialect::LineJson, 1, cancel.clone());
        let task = tokio::spawn(session.run());

        tokio::task::yield_now().await;
        drop(body);
        assert!(cancel.is_cancelled());

        let (outcome, _) = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session must stop promptly")
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert!(released.load(Ordering::SeqCst), "upstream stream must be dropped");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let upstream = chunks(&["{\"message\":{\"content\":\"never\"}}\n"]);
        let (session, body) = RelaySession::open(upstream, Dialect::LineJson, 4, cancel);
        let (outcome, stats) = session.run().await;
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert_eq!(stats, RelayStats::default());
        assert_eq!(collect_body(body).await, "");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let raw = "가".repeat(200);
        assert_eq!(preview(&raw).chars().count(), MALFORMED_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
