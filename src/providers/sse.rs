//! Incremental SSE (Server-Sent Events) parsing
//!
//! Backends deliver streamed completions as SSE over HTTP. The parser here
//! is buffer-based and incremental: bytes arrive in arbitrary chunks, and
//! complete `data:` payloads are emitted as soon as their terminating
//! newline shows up. Provider-specific payload interpretation is injected
//! through [`SseFragmenter`]; the parser itself knows nothing about any
//! backend's JSON shape.

use crate::types::{Result, RouterError};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Provider-specific interpretation of one SSE data payload
pub trait SseFragmenter: Send + Unpin {
    /// Provider name for error attribution
    fn provider_name(&self) -> &str;

    /// Whether this payload terminates the stream
    fn is_end_marker(&self, data: &str) -> bool {
        data.trim() == "[DONE]"
    }

    /// Extract a text fragment from one payload
    ///
    /// `Ok(None)` skips payloads that carry no text (role deltas, pings,
    /// usage trailers).
    fn fragment(&self, data: &str) -> Result<Option<String>>;
}

/// Buffering parser over raw SSE bytes
///
/// The buffer holds raw bytes, not decoded text: a multi-byte UTF-8
/// character split across two network chunks must stay undecoded until its
/// remaining bytes arrive. Decoding happens only up to the last complete
/// line, and `\n` can never occur inside a multi-byte sequence, so the split
/// point is always a character boundary for valid input.
pub struct SseParser {
    buffer: BytesMut,
    done: bool,
}

impl SseParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            done: false,
        }
    }

    /// Whether an end marker has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed bytes, returning every complete `data:` payload they finish
    pub fn feed(&mut self, bytes: &[u8], fragmenter: &dyn SseFragmenter) -> Result<Vec<String>> {
        if self.done {
            return Ok(Vec::new());
        }
        self.buffer.extend_from_slice(bytes);

        let mut fragments = Vec::new();
        // Only lines terminated by a newline are complete; the tail stays
        // buffered for the next feed.
        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Ok(fragments);
        };
        let complete = self.buffer.split_to(last_newline + 1);
        let complete = String::from_utf8_lossy(&complete);

        for line in complete.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(payload) = line.strip_prefix("data:") else {
                // event:/id:/retry: fields carry no text for our purposes.
                continue;
            };
            let payload = payload.trim_start();
            if fragmenter.is_end_marker(payload) {
                self.done = true;
                break;
            }
            if let Some(fragment) = fragmenter.fragment(payload)? {
                if !fragment.is_empty() {
                    fragments.push(fragment);
                }
            }
        }
        Ok(fragments)
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a raw byte stream into a stream of text fragments
///
/// Dropping this stream drops the inner byte stream, which closes the HTTP
/// response body and releases the connection.
pub struct SseTextStream<F: SseFragmenter> {
    inner: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseParser,
    fragmenter: F,
    pending: VecDeque<String>,
}

impl<F: SseFragmenter> SseTextStream<F> {
    /// Wrap a byte stream with a fragmenter
    pub fn new(
        inner: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>,
        fragmenter: F,
    ) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            fragmenter,
            pending: VecDeque::new(),
        }
    }
}

impl<F: SseFragmenter> Stream for SseTextStream<F> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.parser.is_done() {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    match this.parser.feed(&bytes, &this.fragmenter) {
                        Ok(fragments) => this.pending.extend(fragments),
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    }
                    // Loop: either a fragment is now pending or we poll again.
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(RouterError::provider_error(
                        this.fragmenter.provider_name(),
                        format!("stream transport error: {e}"),
                    ))));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
