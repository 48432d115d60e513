//! Incremental server-sent events decoding.
//!
//! Frames are separated by a blank line. Within a frame:
//!
//! ```text
//! : comment lines are ignored
//! event: complete
//! data: {"type":"status","payload":"thinking"}
//! ```
//!
//! Multiple `data:` lines are joined with `\n`. The literal payload
//! `[DONE]` marks the end of a game stream.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::error::MayaError;

pub const DONE_MARKER: &str = "[DONE]";

/// One decoded SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_MARKER
    }
}

/// Byte-level SSE decoder. Feed it chunks as they arrive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes and return every frame completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        // CRLF framing is normalized to LF
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = find_boundary(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = parse_frame(&raw[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.buffer);
        parse_frame(&raw)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(raw: &[u8]) -> Option<SseFrame> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("SSE: dropping frame that is not valid UTF-8: {}", e);
            return None;
        }
    };

    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => frame.event = Some(value.to_string()),
            "id" => frame.id = Some(value.to_string()),
            _ => tracing::trace!("SSE: ignoring field '{}'", field),
        }
    }

    if data_lines.is_empty() && frame.event.is_none() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// SSE frames decoded from a streaming HTTP response.
pub struct SseStream {
    inner: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    done: bool,
}

impl SseStream {
    pub fn new(response: reqwest::Response) -> Self {
        tracing::debug!(
            "SseStream::new - content-type: {:?}",
            response.headers().get("content-type")
        );
        Self::from_byte_stream(Box::pin(response.bytes_stream()))
    }

    pub fn from_byte_stream(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl Stream for SseStream {
    type Item = Result<SseFrame, MayaError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let frames = self.decoder.push(&bytes);
                    tracing::trace!(
                        "SSE: {} bytes -> {} frames ({} buffered)",
                        bytes.len(),
                        frames.len(),
                        self.decoder.buffered_len()
                    );
                    self.pending.extend(frames);
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::error!("SSE: stream error: {}", e);
                    self.done = true;
                    return Poll::Ready(Some(Err(MayaError::Stream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if let Some(frame) = self.decoder.finish() {
                        self.pending.push_back(frame);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    mod decoder {
        use super::*;

        #[test]
        fn test_single_frame() {
            let mut decoder = SseDecoder::new();
            let frames = decoder.push(b"data: {\"type\":\"status\"}\n\n");
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].data, "{\"type\":\"status\"}");
            assert_eq!(frames[0].event, None);
        }

        #[test]
        fn test_frame_split_across_chunks() {
            let mut decoder = SseDecoder::new();
            assert!(decoder.push(b"data: hel").is_empty());
            assert!(decoder.push(b"lo\n").is_empty());
            let frames = decoder.push(b"\ndata: next\n\n");
            assert_eq!(frames.len(), 2);
            assert_eq!(frames[0].data, "hello");
            assert_eq!(frames[1].data, "next");
        }

        #[test]
        fn test_multibyte_char_split_across_chunks() {
            let mut decoder = SseDecoder::new();
            let bytes = "data: café\n\n".as_bytes();
            let split = bytes.len() - 3;
            assert!(decoder.push(&bytes[..split]).is_empty());
            let frames = decoder.push(&bytes[split..]);
            assert_eq!(frames[0].data, "café");
        }

        #[test]
        fn test_event_and_multiline_data() {
            let mut decoder = SseDecoder::new();
            let frames = decoder.push(b"event: complete\ndata: [1,\ndata: 2]\nid: 7\n\n");
            assert_eq!(frames[0].event.as_deref(), Some("complete"));
            assert_eq!(frames[0].data, "[1,\n2]");
            assert_eq!(frames[0].id.as_deref(), Some("7"));
        }

        #[test]
        fn test_comments_and_crlf() {
            let mut decoder = SseDecoder::new();
            let frames = decoder.push(b": keepalive\r\n\r\ndata: x\r\n\r\n");
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].data, "x");
        }

        #[test]
        fn test_done_marker() {
            let mut decoder = SseDecoder::new();
            let frames = decoder.push(b"data: [DONE]\n\n");
            assert!(frames[0].is_done());
        }

        #[test]
        fn test_finish_flushes_trailing_frame() {
            let mut decoder = SseDecoder::new();
            assert!(decoder.push(b"data: tail").is_empty());
            assert_eq!(decoder.finish().unwrap().data, "tail");
            assert!(decoder.finish().is_none());
        }
    }

    mod stream {
        use super::*;

        fn byte_stream(chunks: Vec<&'static str>) -> ByteStream {
            Box::pin(futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<_, reqwest::Error>(Bytes::from_static(c.as_bytes()))),
            ))
        }

        #[tokio::test]
        async fn test_stream_yields_frames_in_order() {
            let stream = SseStream::from_byte_stream(byte_stream(vec![
                "data: a\n\nda",
                "ta: b\n\n",
                "data: c",
            ]));
            let frames: Vec<_> = stream.map(|f| f.unwrap().data).collect().await;
            assert_eq!(frames, vec!["a", "b", "c"]);
        }
    }
}
