//! Line-delimited frame decoding for the service's streaming responses.
//!
//! Each logical event is one `data: <JSON>` line. Chunks can split lines (and
//! UTF-8 sequences) anywhere; the decoder keeps the unfinished tail until the
//! next chunk arrives.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::ServiceError;

/// Prefix that marks an event line.
pub const EVENT_PREFIX: &str = "data: ";

/// Raw response body chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ServiceError>> + Send + 'static>>;

/// Decoded JSON events.
pub type EventStream =
    Pin<Box<dyn futures::Stream<Item = Result<serde_json::Value, ServiceError>> + Send + 'static>>;

/// Incremental decoder with a single text accumulator.
#[derive(Default)]
pub struct FrameDecoder {
    undecoded: Vec<u8>,
    buffer: String,
}

impl FrameDecoder {
    /// Appends a chunk and returns every event completed by it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        self.append_utf8(chunk);
        let Some(last_break) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let tail = self.buffer.split_off(last_break + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);
        complete.lines().filter_map(parse_event_line).collect()
    }

    /// Flushes the accumulator at end of input. A trailing fragment counts as
    /// an event only if it still carries the event prefix.
    pub fn finish(&mut self) -> Option<serde_json::Value> {
        if !self.undecoded.is_empty() {
            self.buffer
                .push_str(&String::from_utf8_lossy(&self.undecoded));
            self.undecoded.clear();
        }
        let fragment = std::mem::take(&mut self.buffer);
        let fragment = fragment.trim_end_matches('\r');
        if fragment.len() <= EVENT_PREFIX.len() {
            return None;
        }
        parse_event_line(fragment)
    }

    fn append_utf8(&mut self, chunk: &[u8]) {
        self.undecoded.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.undecoded.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.undecoded[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid + invalid);
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            self.undecoded.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn parse_event_line(line: &str) -> Option<serde_json::Value> {
    let payload = line.strip_prefix(EVENT_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            let preview: String = payload.chars().take(120).collect();
            warn!(error = %err, line = %preview, "discarding malformed event line");
            None
        }
    }
}

/// Decodes a byte stream into JSON events.
///
/// Built fresh per call. Setting the abort flag ends the sequence the same way
/// the end of the body does; only read failures surface as errors.
pub fn decode_events(bytes: ByteStream, abort: watch::Receiver<bool>) -> EventStream {
    struct State {
        bytes: ByteStream,
        decoder: FrameDecoder,
        pending: VecDeque<serde_json::Value>,
        abort: watch::Receiver<bool>,
        abort_closed: bool,
        done: bool,
    }

    let events = stream::try_unfold(
        State {
            bytes,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            abort,
            abort_closed: false,
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }
                if *state.abort.borrow() {
                    debug!("event stream cancelled");
                    return Ok(None);
                }

                let next = if state.abort_closed {
                    state.bytes.next().await
                } else {
                    tokio::select! {
                        changed = state.abort.changed() => {
                            if changed.is_err() {
                                state.abort_closed = true;
                            }
                            continue;
                        }
                        next = state.bytes.next() => next,
                    }
                };

                match next {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push_chunk(&chunk));
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        state.done = true;
                        state.pending.extend(state.decoder.finish());
                    }
                }
            }
        },
    );
    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(chunks: &[&[u8]]) -> Vec<serde_json::Value> {
        let mut decoder = FrameDecoder::default();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push_chunk(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    fn byte_stream(chunks: Vec<Result<&'static [u8], ServiceError>>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(bytes::Bytes::from_static)),
        ))
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let events = decode_all(&[
            b"data: {\"execution_status\":{\"data_collector\":\"completed\"}}\nda",
            b"ta: {\"execution_status\":{\"data_collector\":\"completed\",\"video_analyzer\":\"running\"}}\n",
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1]["execution_status"]["video_analyzer"],
            json!("running")
        );
    }

    #[test]
    fn every_split_point_yields_the_same_events() {
        let input = "event: values\ndata: {\"a\":1}\r\n\ndata: {\"b\":\"\u{e9}t\u{e9}\"}\ndata: {bad}\ndata: {\"c\":[1,2]}";
        let bytes = input.as_bytes();
        let expected = decode_all(&[bytes]);
        assert_eq!(expected.len(), 3);
        for split in 1..bytes.len() {
            let (left, right) = bytes.split_at(split);
            assert_eq!(decode_all(&[left, right]), expected, "split at {split}");
        }
        let single_bytes: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&single_bytes), expected);
    }

    #[test]
    fn malformed_line_is_skipped_and_decoding_continues() {
        let events =
            decode_all(&[b"data: {bad json}\ndata: {\"errors\":{\"content_analyzer\":\"boom\"}}\n"]);
        assert_eq!(events, vec![json!({"errors": {"content_analyzer": "boom"}})]);
    }

    #[test]
    fn non_event_lines_are_ignored() {
        let events = decode_all(&[b"event: metadata\n: keepalive\n\ndata:{\"tight\":1}\n"]);
        assert!(events.is_empty());
    }

    #[test]
    fn trailing_fragment_needs_prefix_and_content() {
        assert_eq!(decode_all(&[b"data: {\"tail\":true}"]), vec![json!({"tail": true})]);
        assert!(decode_all(&[b"data: "]).is_empty());
        assert!(decode_all(&[b"{\"tail\":true}"]).is_empty());
    }

    #[tokio::test]
    async fn decode_events_yields_in_arrival_order() {
        let (_abort_tx, abort_rx) = watch::channel(false);
        let mut events = decode_events(
            byte_stream(vec![Ok(b"data: {\"n\":1}\ndata: {\"n\""), Ok(b":2}\n")]),
            abort_rx,
        );
        assert_eq!(events.next().await, Some(Ok(json!({"n": 1}))));
        assert_eq!(events.next().await, Some(Ok(json!({"n": 2}))));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn read_failure_is_surfaced_after_earlier_events() {
        let (_abort_tx, abort_rx) = watch::channel(false);
        let mut events = decode_events(
            byte_stream(vec![
                Ok(b"data: {\"n\":1}\n"),
                Err(ServiceError::transport("connection reset")),
            ]),
            abort_rx,
        );
        assert_eq!(events.next().await, Some(Ok(json!({"n": 1}))));
        assert!(matches!(
            events.next().await,
            Some(Err(ServiceError::Transport { .. }))
        ));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn abort_ends_pending_stream_cleanly() {
        let (abort_tx, abort_rx) = watch::channel(false);
        let body: ByteStream = Box::pin(
            stream::iter(vec![Ok::<_, ServiceError>(bytes::Bytes::from_static(b"data: {\"n\":1}\n"))])
                .chain(stream::pending()),
        );
        let mut events = decode_events(body, abort_rx);
        assert_eq!(events.next().await, Some(Ok(json!({"n": 1}))));
        let _ = abort_tx.send(true);
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn dropped_abort_sender_does_not_end_stream() {
        let (abort_tx, abort_rx) = watch::channel(false);
        drop(abort_tx);
        let mut events = decode_events(byte_stream(vec![Ok(b"data: {\"n\":1}\n")]), abort_rx);
        assert_eq!(events.next().await, Some(Ok(json!({"n": 1}))));
        assert_eq!(events.next().await, None);
    }
}
