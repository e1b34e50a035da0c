//! Incremental line decoder for upstream token streams.
//!
//! Bytes arrive in arbitrary chunks. A line (and a UTF-8 character) may be
//! split across any number of chunks, and one chunk may carry many lines.
//! Only lines closed by `\n` are decoded; the unterminated tail waits for
//! the next chunk and is dropped at end of stream.
use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

use super::{Dialect, UpstreamFrame};
use crate::error::RelayError;
use crate::protocol::wire::{ndjson_content, sse_content};

const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE_SENTINEL: &str = "[DONE]";

struct PendingFrames {
    frames: SmallVec<[UpstreamFrame; 8]>,
    head: usize,
}

impl PendingFrames {
    #[inline]
    fn new() -> Self {
        Self {
            frames: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<UpstreamFrame> {
        if self.head >= self.frames.len() {
            return None;
        }
        let frame = std::mem::replace(&mut self.frames[self.head], UpstreamFrame::Terminal);
        self.head += 1;
        if self.head == self.frames.len() {
            self.frames.clear();
            self.head = 0;
        }
        Some(frame)
    }

    #[inline]
    fn extend_from_vec(&mut self, decoded: &mut Vec<UpstreamFrame>) {
        if decoded.is_empty() {
            return;
        }
        self.frames.extend(decoded.drain(..));
    }
}

/// Per-session decode state: the pending text tail plus any bytes of a
/// UTF-8 sequence cut off at the end of the last chunk.
pub struct FrameDecoder {
    dialect: Dialect,
    buffer: String,
    read_offset: usize,
    utf8_tail: SmallVec<[u8; 4]>,
    finished: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            buffer: String::new(),
            read_offset: 0,
            utf8_tail: SmallVec::new(),
            finished: false,
        }
    }

    /// `true` once a terminal sentinel has been decoded. Later input is ignored.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk and return the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<UpstreamFrame> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk and append completed frames to `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<UpstreamFrame>) {
        if self.finished {
            return;
        }

        // Everything before the old end was already scanned for newlines.
        let scan_start = self.buffer.len();
        self.push_bytes(chunk);

        let mut processed_up_to = self.read_offset;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            processed_up_to = line_end + 1;

            let Some(frame) = decode_line(self.dialect, line) else {
                continue;
            };
            let terminal = frame == UpstreamFrame::Terminal;
            out.push(frame);
            if terminal {
                self.finished = true;
                break;
            }
        }

        if self.finished {
            self.buffer = String::new();
            self.read_offset = 0;
            self.utf8_tail.clear();
            return;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// End of upstream input. The unterminated tail is discarded, never
    /// decoded; returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len() - self.read_offset + self.utf8_tail.len();
        self.buffer = String::new();
        self.read_offset = 0;
        self.utf8_tail.clear();
        discarded
    }

    fn push_bytes(&mut self, chunk: &[u8]) {
        if self.utf8_tail.is_empty() {
            self.push_utf8(chunk);
        } else {
            let mut joined = std::mem::take(&mut self.utf8_tail).into_vec();
            joined.extend_from_slice(chunk);
            self.push_utf8(&joined);
        }
    }

    fn push_utf8(&mut self, mut bytes: &[u8]) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[invalid_len..];
                        }
                        None => {
                            // Incomplete sequence at chunk end; wait for more bytes.
                            self.utf8_tail.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn decode_line(dialect: Dialect, line: &str) -> Option<UpstreamFrame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match dialect {
        Dialect::LineJson => decode_json_line(line),
        Dialect::Sse => decode_sse_line(line),
    }
}

fn decode_json_line(line: &str) -> Option<UpstreamFrame> {
    match ndjson_content(line) {
        Ok(text) => text.map(UpstreamFrame::Token),
        Err(err) => Some(UpstreamFrame::Malformed {
            raw: line.to_owned(),
            error: err.to_string(),
        }),
    }
}

fn decode_sse_line(line: &str) -> Option<UpstreamFrame> {
    // `event:`, `id:`, `retry:` and `:` comment lines carry no text.
    let payload = line.strip_prefix(SSE_DATA_PREFIX)?.trim();
    if payload == SSE_DONE_SENTINEL {
        return Some(UpstreamFrame::Terminal);
    }
    if payload.is_empty() {
        return None;
    }
    match sse_content(payload) {
        Ok(text) => text.map(UpstreamFrame::Token),
        Err(err) => Some(UpstreamFrame::Malformed {
            raw: line.to_owned(),
            error: err.to_string(),
        }),
    }
}

/// Decode an upstream byte stream into frames, lazily.
///
/// The stream ends right after a `Terminal` frame without polling the
/// upstream again. A read error is yielded once as
/// [`RelayError::StreamInterrupted`] and then the stream ends.
pub fn frame_stream<S, E>(
    byte_stream: S,
    dialect: Dialect,
) -> impl Stream<Item = Result<UpstreamFrame, RelayError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            FrameDecoder::new(dialect),
            Vec::<UpstreamFrame>::with_capacity(8),
            PendingFrames::new(),
            false,
        ),
        |(mut stream, mut decoder, mut decoded, mut pending, mut exhausted)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (stream, decoder, decoded, pending, exhausted)));
                }
                if exhausted || decoder.is_finished() {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        decoder.feed_into(&bytes, &mut decoded);
                        pending.extend_from_vec(&mut decoded);
                    }
                    Some(Err(err)) => {
                        exhausted = true;
                        let err = RelayError::StreamInterrupted(err.to_string());
                        return Some((Err(err), (stream, decoder, decoded, pending, exhausted)));
                    }
                    None => {
                        let discarded = decoder.finish();
                        if discarded > 0 {
                            tracing::debug!(
                                discarded_bytes = discarded,
                                "upstream ended mid-line, dropping unterminated tail"
                            );
                        }
                        return None;
                    }
                }
            }
        },
    )
}
