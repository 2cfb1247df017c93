//! Payload rewriting: text sanitization and the JSON edits around it.

pub mod payload;
pub mod request;
pub mod sanitizer;

pub use payload::{rewrite_buffered_body, sanitize_chunk_delta, BufferedRewrite};
pub use request::{normalize_chat_request, ChatRequestPolicy, NormalizedChatRequest};
pub use sanitizer::ContentSanitizer;
