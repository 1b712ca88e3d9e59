//! Stream decoder: raw upstream bytes → ordered [`StreamDelta`]s.
//!
//! The transport is line oriented (`data: {...}\n`, optionally separated by
//! blank lines) but network chunks do not respect line boundaries.  The
//! decoder keeps a byte carry-over buffer, processes only complete lines,
//! and guarantees exactly one terminal delta for every stream that does
//! not fail:
//!
//! - [`LineDecoder`] -- synchronous, push-style decoder
//! - [`delta_stream`] -- wraps a [`ByteStream`] into a `BoxStream` of deltas
//! - [`spawn_decoder`] -- runs [`delta_stream`] as a producer task feeding a
//!   bounded channel

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cr_domain::error::{Error, Result};
use cr_domain::stream::{BoxStream, StreamDelta};
use cr_domain::trace::TraceEvent;

use crate::event::{parse_event, UpstreamEvent};
use crate::traits::ByteStream;

/// Payload that ends a stream without a structured parse.
pub const DONE_SENTINEL: &str = "[DONE]";

const LINE_PREVIEW_CHARS: usize = 120;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LineDecoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Push-style decoder for one upstream stream.
///
/// Splitting happens on raw bytes, so a multi-byte UTF-8 character cut in
/// half by the network is reassembled before it is decoded.  The output is
/// therefore identical however the input was chunked.
pub struct LineDecoder {
    provider: String,
    buffer: Vec<u8>,
    finished: bool,
}

impl LineDecoder {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// `true` once a terminal delta (or an in-band failure) was produced.
    /// Further input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network chunk and return the items it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamDelta>> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop(); // the \n itself
            self.process_line(&line, &mut out);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// Signal end of input: parse whatever partial line is left, then make
    /// sure a terminal delta has been produced.
    pub fn finish(&mut self) -> Vec<Result<StreamDelta>> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.process_line(&rest, &mut out);
        if !self.finished {
            self.finished = true;
            out.push(Ok(StreamDelta::terminal()));
        }
        out
    }

    fn process_line(&mut self, raw: &[u8], out: &mut Vec<Result<StreamDelta>>) {
        let line = String::from_utf8_lossy(raw);
        let Some(payload) = data_payload(&line) else {
            return;
        };

        if payload == DONE_SENTINEL {
            self.finished = true;
            out.push(Ok(StreamDelta::terminal()));
            return;
        }

        match parse_event(payload) {
            Ok(UpstreamEvent::Failure { message }) => {
                self.finished = true;
                out.push(Err(Error::transport(&self.provider, message)));
            }
            Ok(UpstreamEvent::UsageOnly) => {}
            Ok(UpstreamEvent::Unknown) => decode_warning("unrecognized event shape", payload),
            Ok(event) => {
                if !event.content().is_empty() {
                    out.push(Ok(StreamDelta::content(event.content())));
                }
                if let Some(reason) = event.finish_reason() {
                    tracing::debug!(provider = %self.provider, finish_reason = reason, "stream finished");
                    self.finished = true;
                    out.push(Ok(StreamDelta::terminal()));
                }
            }
            Err(e) => decode_warning(&e.to_string(), payload),
        }
    }
}

/// Extract the event payload from one transport line.
///
/// Accepts SSE (`data: ...`) and bare newline-delimited JSON.  Blank lines,
/// SSE comments and non-data SSE fields yield `None`.
fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        return (!data.is_empty()).then_some(data);
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return None;
    }
    Some(line)
}

fn decode_warning(reason: &str, payload: &str) {
    TraceEvent::DecodeWarning {
        reason: reason.to_owned(),
        line_preview: payload.chars().take(LINE_PREVIEW_CHARS).collect(),
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Async adapters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode a [`ByteStream`] into deltas.
///
/// The stream:
/// 1. Feeds every chunk through a [`LineDecoder`], in order
/// 2. Stops pulling chunks as soon as a terminal delta was produced
/// 3. Flushes the carry-over buffer and forces a terminal delta when the
///    body ends without one
/// 4. Yields a single `Err` and ends if the byte source fails
pub fn delta_stream(
    provider: impl Into<String>,
    bytes: ByteStream,
) -> BoxStream<'static, Result<StreamDelta>> {
    let provider = provider.into();
    let stream = async_stream::stream! {
        let mut bytes = bytes;
        let mut decoder = LineDecoder::new(provider);

        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    for item in decoder.feed(&chunk) {
                        yield item;
                    }
                    if decoder.is_finished() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => {
                    for item in decoder.finish() {
                        yield item;
                    }
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

/// Receiving end of a decoder task.
///
/// Dropping the handle aborts the producer, which drops the upstream body
/// and releases its connection even if the upstream is stalled.
pub struct DecoderHandle {
    rx: mpsc::Receiver<Result<StreamDelta>>,
    task: JoinHandle<()>,
}

impl DecoderHandle {
    /// Next decoded item, or `None` once the producer is done.
    pub async fn recv(&mut self) -> Option<Result<StreamDelta>> {
        self.rx.recv().await
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run [`delta_stream`] on its own task, pushing items onto a bounded
/// channel of `capacity` slots.  The consumer sees items in decode order.
pub fn spawn_decoder(
    provider: impl Into<String>,
    bytes: ByteStream,
    capacity: usize,
) -> DecoderHandle {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let mut deltas = delta_stream(provider, bytes);

    let task = tokio::spawn(async move {
        while let Some(item) = deltas.next().await {
            if tx.send(item).await.is_err() {
                tracing::debug!("delta consumer went away, dropping upstream stream");
                return;
            }
        }
    });

    DecoderHandle { rx, task }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<StreamDelta> {
        let mut decoder = LineDecoder::new("test");
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        out.extend(decoder.finish());
        out.into_iter().map(|r| r.unwrap()).collect()
    }

    fn texts(deltas: &[StreamDelta]) -> Vec<&str> {
        deltas.iter().map(|d| d.text.as_str()).collect()
    }

    fn byte_stream(chunks: Vec<Vec<u8>>) -> ByteStream {
        Box::pin(futures_util::stream::iter(chunks.into_iter().map(Ok)))
    }

    const TRANSCRIPT: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Bonjour, \"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ça va? 🙂\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" Très bien.\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn line_split_across_chunks() {
        let deltas = decode_all(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
            b"lo\"}}]}\n",
        ]);
        assert_eq!(deltas[0], StreamDelta::content("Hello"));
        assert!(!deltas[0].is_terminal);
        // Forced terminal at end of input.
        assert_eq!(deltas.len(), 2);
        assert!(deltas[1].is_terminal);
    }

    #[test]
    fn done_sentinel_alone() {
        let deltas = decode_all(&[b"data: [DONE]\n"]);
        assert_eq!(deltas, vec![StreamDelta::terminal()]);
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let deltas = decode_all(&[concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n",
        )
        .as_bytes()]);
        assert_eq!(texts(&deltas), vec!["a", "b", "c", ""]);
    }

    #[test]
    fn chunking_invariance_at_every_split() {
        let bytes = TRANSCRIPT.as_bytes();
        let whole = decode_all(&[bytes]);
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), whole, "split at byte {split}");
        }
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&singles), whole);
    }

    #[test]
    fn concatenation_equals_full_text() {
        let deltas = decode_all(&[TRANSCRIPT.as_bytes()]);
        let full: String = deltas
            .iter()
            .filter(|d| !d.is_terminal)
            .map(|d| d.text.as_str())
            .collect();
        assert_eq!(full, "Bonjour, ça va? 🙂 Très bien.");
        assert_eq!(deltas.iter().filter(|d| d.is_terminal).count(), 1);
        assert!(deltas.last().unwrap().is_terminal);
    }

    #[test]
    fn finish_reason_emits_trailing_content_then_stops() {
        let mut decoder = LineDecoder::new("test");
        let out: Vec<StreamDelta> = decoder
            .feed(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"end\"},\"finish_reason\":\"stop\"}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
            )
            .as_bytes())
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(out, vec![StreamDelta::content("end"), StreamDelta::terminal()]);
        assert!(decoder.is_finished());
        assert!(decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")
            .is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let deltas = decode_all(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n",
            b"data: {this is not json\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\" two\"}}]}\n",
        ]);
        assert_eq!(texts(&deltas), vec!["one", " two", ""]);
    }

    #[test]
    fn unknown_shape_is_skipped() {
        let deltas = decode_all(&[b"data: {\"ping\":true}\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"]);
        assert_eq!(texts(&deltas), vec!["x", ""]);
    }

    #[test]
    fn no_finish_signal_forces_one_terminal() {
        let deltas = decode_all(&[b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"]);
        assert_eq!(deltas.iter().filter(|d| d.is_terminal).count(), 1);
    }

    #[test]
    fn empty_input_still_terminates() {
        let deltas = decode_all(&[b"", b""]);
        assert_eq!(deltas, vec![StreamDelta::terminal()]);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let deltas = decode_all(&[b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]);
        assert_eq!(texts(&deltas), vec!["tail", ""]);
    }

    #[test]
    fn bare_ndjson_and_crlf_lines() {
        let deltas = decode_all(&[
            b"{\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n",
            b"event: message\r\nid: 7\r\nretry: 100\r\n",
            b"{\"choices\":[{\"message\":{\"content\":\"b\"},\"finish_reason\":\"stop\"}]}\r\n",
        ]);
        assert_eq!(texts(&deltas), vec!["a", "b", ""]);
    }

    #[test]
    fn heartbeat_contributes_nothing() {
        let deltas = decode_all(&[b"data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n"]);
        assert_eq!(deltas, vec![StreamDelta::terminal()]);
    }

    #[test]
    fn in_band_error_ends_with_transport_error() {
        let mut decoder = LineDecoder::new("openrouter");
        let out = decoder.feed(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n",
        )
        .as_bytes());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &StreamDelta::content("par"));
        assert!(matches!(
            &out[1],
            Err(Error::Transport { provider, message }) if provider == "openrouter" && message == "overloaded"
        ));
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn data_payload_filters() {
        assert_eq!(data_payload("data: x"), Some("x"));
        assert_eq!(data_payload("data:x"), Some("x"));
        assert_eq!(data_payload("data:   "), None);
        assert_eq!(data_payload("   "), None);
        assert_eq!(data_payload(": comment"), None);
        assert_eq!(data_payload("event: delta"), None);
        assert_eq!(data_payload("{\"a\":1}"), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn delta_stream_stops_reading_after_terminal() {
        let chunks = vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}]}\n".to_vec(),
            b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n".to_vec(),
        ];
        let out: Vec<_> = delta_stream("test", byte_stream(chunks)).collect().await;
        let out: Vec<StreamDelta> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec![StreamDelta::content("hi"), StreamDelta::terminal()]);
    }

    #[tokio::test]
    async fn delta_stream_surfaces_source_failure() {
        let bytes: ByteStream = Box::pin(futures_util::stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"part\"}}]}\n".to_vec()),
            Err(Error::transport("test", "connection reset")),
            Ok(b"data: [DONE]\n".to_vec()),
        ]));
        let out: Vec<_> = delta_stream("test", bytes).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &StreamDelta::content("part"));
        assert!(matches!(out[1], Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn spawned_decoder_preserves_order() {
        let chunks: Vec<Vec<u8>> = (0..50)
            .map(|i| format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{i},\"}}}}]}}\n").into_bytes())
            .collect();
        let mut handle = spawn_decoder("test", byte_stream(chunks), 4);
        let mut text = String::new();
        let mut terminals = 0;
        while let Some(item) = handle.recv().await {
            let delta = item.unwrap();
            if delta.is_terminal {
                terminals += 1;
            } else {
                text.push_str(&delta.text);
            }
        }
        let expected: String = (0..50).map(|i| format!("{i},")).collect();
        assert_eq!(text, expected);
        assert_eq!(terminals, 1);
    }
}
