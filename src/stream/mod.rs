pub mod sse;

pub use sse::{rewrite_frame, FrameKind, FrameReassembler, RewrittenFrame, Utf8Decoder};

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

use crate::rewrite::ContentSanitizer;

/// A discarded remainder this large usually means the upstream frames events
/// with a delimiter other than `\n\n`.
const LARGE_REMAINDER_BYTES: usize = 64 * 1024;

struct PendingFrames {
    frames: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingFrames {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut frames = SmallVec::new();
        frames.reserve(capacity);
        Self { frames, head: 0 }
    }

    #[inline]
    fn push(&mut self, frame: Bytes) {
        self.frames.push(frame);
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.frames.len() {
            return None;
        }
        let frame = std::mem::take(&mut self.frames[self.head]);
        self.head += 1;
        if self.head == self.frames.len() {
            self.frames.clear();
            self.head = 0;
        }
        Some(frame)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamStats {
    frames: u64,
    sanitized: u64,
    saw_done: bool,
}

impl StreamStats {
    fn record(&mut self, kind: FrameKind) {
        self.frames += 1;
        match kind {
            FrameKind::Sanitized => self.sanitized += 1,
            FrameKind::Done => self.saw_done = true,
            FrameKind::Passthrough => {}
        }
    }
}

struct SanitizeState<S> {
    upstream: std::pin::Pin<Box<S>>,
    sanitizer: Arc<ContentSanitizer>,
    reassembler: FrameReassembler,
    completed: Vec<String>,
    pending: PendingFrames,
    stats: StreamStats,
    finished: bool,
}

/// Re-frame and sanitize an upstream SSE body.
///
/// Pull-driven: the upstream is read only when the consumer asks for the next
/// frame and every frame completed by a chunk has been handed out. Dropping
/// the returned stream drops the upstream body with it. An upstream read
/// error is yielded once and ends the stream.
pub fn sanitize_sse_stream<S, E>(
    byte_stream: S,
    sanitizer: Arc<ContentSanitizer>,
) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SanitizeState {
        upstream: Box::pin(byte_stream),
        sanitizer,
        reassembler: FrameReassembler::new(),
        completed: Vec::with_capacity(8),
        pending: PendingFrames::with_capacity(8),
        stats: StreamStats::default(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }

            match state.upstream.as_mut().next().await {
                Some(Ok(chunk)) => {
                    state.reassembler.feed_into(&chunk, &mut state.completed);
                    for frame in state.completed.drain(..) {
                        let rewritten = rewrite_frame(frame, &state.sanitizer);
                        state.stats.record(rewritten.kind);
                        state.pending.push(rewritten.bytes);
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        error = %err,
                        frames = state.stats.frames,
                        "upstream stream failed mid-response"
                    );
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    let discarded = state.reassembler.finish();
                    if remainder_looks_unframed(discarded, state.stats.frames) {
                        tracing::warn!(
                            bytes = discarded,
                            frames = state.stats.frames,
                            "discarding unterminated upstream data; no `\\n\\n` frame delimiter found"
                        );
                    } else if discarded > 0 {
                        tracing::debug!(
                            bytes = discarded,
                            "discarding unterminated trailing frame"
                        );
                    }
                    tracing::debug!(
                        frames = state.stats.frames,
                        sanitized = state.stats.sanitized,
                        done = state.stats.saw_done,
                        "upstream stream ended"
                    );
                    state.finished = true;
                }
            }
        }
    })
}

fn remainder_looks_unframed(discarded: usize, frames: u64) -> bool {
    discarded > 0 && (frames == 0 || discarded >= LARGE_REMAINDER_BYTES)
}
