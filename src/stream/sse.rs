//! SSE frame reassembly and per-frame rewriting.
//!
//! Upstream bytes arrive in arbitrary chunks. [`FrameReassembler`] decodes
//! them incrementally, cuts complete frames on the blank-line delimiter and
//! keeps only the unterminated tail between calls. [`rewrite_frame`] then
//! turns each complete frame back into wire bytes, sanitizing the delta text
//! of chat-completion chunks on the way.

use std::sync::LazyLock;

use bytes::Bytes;
use memchr::memmem;
use serde_json::Value;

use crate::rewrite::{sanitize_chunk_delta, ContentSanitizer};

const DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data:";
const DONE_PAYLOAD: &str = "[DONE]";
const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

static DELIMITER_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(DELIMITER.as_bytes()));

// ---------------------------------------------------------------------------
// Utf8Decoder
// ---------------------------------------------------------------------------

/// Incremental, lossy UTF-8 decoder.
///
/// A multi-byte character split across chunks is held back until its
/// remaining bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` and append the text to `out`.
    pub fn decode_into(&mut self, chunk: &[u8], out: &mut String) {
        if self.partial.is_empty() {
            let rest = decode_lossy(chunk, out);
            self.partial.extend_from_slice(rest);
            return;
        }
        let mut joined = std::mem::take(&mut self.partial);
        joined.extend_from_slice(chunk);
        let rest = decode_lossy(&joined, out);
        self.partial = rest.to_vec();
    }

    /// Bytes of an incomplete character still held back.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    pub fn reset(&mut self) {
        self.partial.clear();
    }
}

/// Decode everything up to a trailing incomplete sequence, which is returned.
fn decode_lossy<'b>(mut bytes: &'b [u8], out: &mut String) -> &'b [u8] {
    loop {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                out.push_str(text);
                return &[];
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                out.push_str(unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) });
                match err.error_len() {
                    Some(invalid_len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        bytes = &bytes[valid_up_to + invalid_len..];
                    }
                    None => return &bytes[valid_up_to..],
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FrameReassembler
// ---------------------------------------------------------------------------

/// Splits a chunked byte stream into complete SSE frames.
///
/// Frames are yielded without their `\n\n` delimiter. The only state kept
/// between calls is the unterminated remainder (plus at most three bytes of
/// an unfinished UTF-8 character).
#[derive(Debug, Default)]
pub struct FrameReassembler {
    decoder: Utf8Decoder,
    buffer: String,
    scan_from: usize,
}

impl FrameReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one upstream chunk and return the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one upstream chunk and append completed frames to `frames`.
    pub fn feed_into(&mut self, chunk: &[u8], frames: &mut Vec<String>) {
        self.decoder.decode_into(chunk, &mut self.buffer);

        let mut consumed = 0usize;
        let mut scan = self.scan_from.min(self.buffer.len());
        while let Some(rel) = DELIMITER_FINDER.find(&self.buffer.as_bytes()[scan..]) {
            let frame_end = scan + rel;
            frames.push(self.buffer[consumed..frame_end].to_string());
            consumed = frame_end + DELIMITER.len();
            scan = consumed;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        // A trailing `\n` may pair with the first byte of the next chunk.
        self.scan_from = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
    }

    /// Text held back waiting for a delimiter.
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// End of upstream data. Returns the byte length of the unterminated
    /// remainder, which is discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len() + self.decoder.pending_len();
        self.buffer.clear();
        self.decoder.reset();
        self.scan_from = 0;
        discarded
    }
}

// ---------------------------------------------------------------------------
// Frame rewriting
// ---------------------------------------------------------------------------

/// What [`rewrite_frame`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The `[DONE]` sentinel.
    Done,
    /// A chat chunk whose delta text was sanitized and re-serialized.
    Sanitized,
    /// Emitted as received: non-data frames, unparseable payloads and chunks
    /// with nothing to clean.
    Passthrough,
}

/// One frame ready for the client, delimiter included.
#[derive(Debug, Clone)]
pub struct RewrittenFrame {
    pub bytes: Bytes,
    pub kind: FrameKind,
}

enum FrameAction {
    Done,
    Replace(Vec<u8>),
    Passthrough,
}

/// Turn one complete frame (without delimiter) into client bytes.
#[must_use]
pub fn rewrite_frame(frame: String, sanitizer: &ContentSanitizer) -> RewrittenFrame {
    match classify_frame(&frame, sanitizer) {
        FrameAction::Done => RewrittenFrame {
            bytes: Bytes::from_static(DONE_FRAME),
            kind: FrameKind::Done,
        },
        FrameAction::Replace(json) => {
            let mut out = Vec::with_capacity(DATA_PREFIX.len() + 1 + json.len() + DELIMITER.len());
            out.extend_from_slice(b"data: ");
            out.extend_from_slice(&json);
            out.extend_from_slice(DELIMITER.as_bytes());
            RewrittenFrame {
                bytes: Bytes::from(out),
                kind: FrameKind::Sanitized,
            }
        }
        FrameAction::Passthrough => {
            let mut frame = frame;
            frame.push_str(DELIMITER);
            RewrittenFrame {
                bytes: Bytes::from(frame),
                kind: FrameKind::Passthrough,
            }
        }
    }
}

fn classify_frame(frame: &str, sanitizer: &ContentSanitizer) -> FrameAction {
    let Some(rest) = frame.strip_prefix(DATA_PREFIX) else {
        return FrameAction::Passthrough;
    };
    let payload = rest.trim();
    if payload == DONE_PAYLOAD {
        return FrameAction::Done;
    }
    let Ok(mut chunk) = serde_json::from_str::<Value>(payload) else {
        return FrameAction::Passthrough;
    };
    if !sanitize_chunk_delta(&mut chunk, sanitizer) {
        return FrameAction::Passthrough;
    }
    match serde_json::to_vec(&chunk) {
        Ok(json) => FrameAction::Replace(json),
        Err(err) => {
            tracing::warn!(error = %err, "failed to re-serialize sanitized chunk, passing through");
            FrameAction::Passthrough
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(frame: &str) -> RewrittenFrame {
        rewrite_frame(frame.to_string(), &ContentSanitizer::default())
    }

    fn text(frame: &RewrittenFrame) -> &str {
        std::str::from_utf8(&frame.bytes).expect("utf-8 frame")
    }

    // -- Utf8Decoder --

    #[test]
    fn test_decoder_joins_split_character() {
        let bytes = "héllo 🐉".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in bytes {
            decoder.decode_into(std::slice::from_ref(byte), &mut out);
        }
        assert_eq!(out, "héllo 🐉");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decoder_holds_incomplete_tail() {
        let dragon = "🐉".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode_into(&dragon[..2], &mut out);
        assert_eq!(out, "");
        assert_eq!(decoder.pending_len(), 2);
        decoder.decode_into(&dragon[2..], &mut out);
        assert_eq!(out, "🐉");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode_into(b"a\xffb\xc3(c", &mut out);
        assert_eq!(out, "a\u{FFFD}b\u{FFFD}(c");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decoder_invalid_continuation_after_partial() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode_into(b"\xe2\x82", &mut out);
        decoder.decode_into(b"x", &mut out);
        assert_eq!(out, "\u{FFFD}x");
    }

    // -- FrameReassembler --

    #[test]
    fn test_reassembler_splits_complete_frames() {
        let mut reassembler = FrameReassembler::new();
        let frames = reassembler.feed(b"data: a\n\n: comment\n\ndata: b");
        assert_eq!(frames, vec!["data: a", ": comment"]);
        assert_eq!(reassembler.remainder(), "data: b");
    }

    #[test]
    fn test_reassembler_buffers_across_chunks() {
        let mut reassembler = FrameReassembler::new();
        assert!(reassembler.feed(b"data: {\"id\":1").is_empty());
        assert_eq!(reassembler.feed(b"}\n\n"), vec!["data: {\"id\":1}"]);
        assert_eq!(reassembler.remainder(), "");
    }

    #[test]
    fn test_reassembler_delimiter_split_across_chunks() {
        let mut reassembler = FrameReassembler::new();
        assert!(reassembler.feed(b"data: x\n").is_empty());
        assert_eq!(reassembler.feed(b"\ndata: y\n"), vec!["data: x"]);
        assert_eq!(reassembler.feed(b"\n"), vec!["data: y"]);
    }

    #[test]
    fn test_reassembler_matches_leftmost_delimiter() {
        let mut whole = FrameReassembler::new();
        let expected = whole.feed(b"a\n\n\n\nb\n\n\n");

        let mut split = FrameReassembler::new();
        let mut frames = Vec::new();
        for byte in b"a\n\n\n\nb\n\n\n" {
            split.feed_into(std::slice::from_ref(byte), &mut frames);
        }
        assert_eq!(expected, vec!["a", "", "b"]);
        assert_eq!(frames, expected);
        assert_eq!(split.remainder(), "\n");
    }

    #[test]
    fn test_reassembler_finish_discards_remainder() {
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(b"data: done\n\ndata: trunc");
        assert_eq!(reassembler.finish(), "data: trunc".len());
        assert_eq!(reassembler.remainder(), "");
        assert_eq!(reassembler.finish(), 0);
    }

    // -- rewrite_frame --

    #[test]
    fn test_done_sentinel_is_verbatim() {
        for frame in ["data: [DONE]", "data:[DONE]", "data:  [DONE]  "] {
            let out = rewrite(frame);
            assert_eq!(out.kind, FrameKind::Done);
            assert_eq!(text(&out), "data: [DONE]\n\n");
        }
    }

    #[test]
    fn test_delta_is_sanitized_and_siblings_kept() {
        let out = rewrite(
            r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"```json\n{x}\n```Hello"},"finish_reason":null}],"usage":null}"#,
        );
        assert_eq!(out.kind, FrameKind::Sanitized);
        assert_eq!(
            text(&out),
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}],\"usage\":null}\n\n"
        );
    }

    #[test]
    fn test_clean_chunk_is_emitted_as_received() {
        let frame = r#"data:{"id": "c1", "choices": [{"delta": {"content": " world"}}]}"#;
        let out = rewrite(frame);
        assert_eq!(out.kind, FrameKind::Passthrough);
        assert_eq!(text(&out), format!("{frame}\n\n"));
    }

    #[test]
    fn test_unparseable_payload_passes_through() {
        let out = rewrite("data: {\"choices\": [");
        assert_eq!(out.kind, FrameKind::Passthrough);
        assert_eq!(text(&out), "data: {\"choices\": [\n\n");
    }

    #[test]
    fn test_non_data_frames_pass_through() {
        for frame in [": keep-alive", "event: ping", "id: 7\nretry: 100", ""] {
            let out = rewrite(frame);
            assert_eq!(out.kind, FrameKind::Passthrough);
            assert_eq!(text(&out), format!("{frame}\n\n"));
        }
    }

    #[test]
    fn test_crlf_delimited_input_is_held_then_discarded() {
        let mut reassembler = FrameReassembler::new();
        let chunk = b"data: {\"a\":1}\r\n\r\n";
        for _ in 0..10 {
            assert!(reassembler.feed(chunk).is_empty());
        }
        assert_eq!(reassembler.remainder().len(), chunk.len() * 10);
        assert_eq!(reassembler.finish(), chunk.len() * 10);
        assert!(reassembler.remainder().is_empty());
    }
}
