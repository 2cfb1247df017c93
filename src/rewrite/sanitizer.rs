//! Removal of provider debug artifacts from generated text.
//!
//! Rules, in order:
//! 1. drop every ```` ```json ```` fenced block (tag matched case-insensitively);
//! 2. if the trimmed text opens with an object whose `"id"` carries an internal
//!    prefix, drop everything from there on;
//! 3. trim surrounding whitespace.
//!
//! Rule 2 is a heuristic. A legitimate answer that starts with
//! `{"id":"dragon_...` is indistinguishable from a leaked debug object and will
//! be blanked; any other fence language and ordinary prose are left alone.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::config::SanitizerConfig;

const FENCE: &str = "```";

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```json\b.*?```").expect("fence pattern is valid"));

#[derive(Debug, Clone)]
pub struct ContentSanitizer {
    internal_object: Option<Regex>,
}

impl ContentSanitizer {
    /// Build a sanitizer flagging `"id"` values that start with any of `prefixes`.
    #[must_use]
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Self {
        let alternatives: Vec<String> = prefixes
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|prefix| !prefix.is_empty())
            .map(regex_lite::escape)
            .collect();
        let internal_object = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(
                r#"^\{{[\s\S]*?"id"\s*:\s*"(?:{})"#,
                alternatives.join("|")
            );
            Regex::new(&pattern).ok()
        };
        Self { internal_object }
    }

    #[must_use]
    pub fn from_config(config: &SanitizerConfig) -> Self {
        Self::new(&config.internal_id_prefixes)
    }

    /// Apply all three rules. Idempotent.
    #[must_use]
    pub fn sanitize<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self.strip_json_fences(text) {
            Cow::Borrowed(stripped) => Cow::Borrowed(self.strip_internal_object(stripped.trim())),
            Cow::Owned(stripped) => {
                Cow::Owned(self.strip_internal_object(stripped.trim()).to_string())
            }
        }
    }

    /// Sanitize a streaming delta.
    ///
    /// Deltas carry their own leading/trailing spaces, so text that no
    /// removal rule touches comes back unchanged instead of trimmed.
    #[must_use]
    pub fn sanitize_fragment<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.has_artifacts(text) {
            self.sanitize(text)
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Whether rule 1 or rule 2 would remove anything from `text`.
    #[must_use]
    pub fn has_artifacts(&self, text: &str) -> bool {
        (text.contains(FENCE) && FENCED_JSON.is_match(text))
            || self.starts_with_internal_object(text.trim())
    }

    fn strip_json_fences<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text.contains(FENCE) || !FENCED_JSON.is_match(text) {
            return Cow::Borrowed(text);
        }
        // Removing one block can splice the remains of two others into a
        // new one, so repeat until nothing matches.
        let mut out = FENCED_JSON.replace_all(text, "").into_owned();
        while FENCED_JSON.is_match(&out) {
            out = FENCED_JSON.replace_all(&out, "").into_owned();
        }
        Cow::Owned(out)
    }

    fn starts_with_internal_object(&self, trimmed: &str) -> bool {
        trimmed.starts_with('{')
            && self
                .internal_object
                .as_ref()
                .is_some_and(|re| re.is_match(trimmed))
    }

    fn strip_internal_object<'s>(&self, trimmed: &'s str) -> &'s str {
        if !trimmed.starts_with('{') {
            return trimmed;
        }
        match self.internal_object.as_ref().and_then(|re| re.find(trimmed)) {
            Some(found) => trimmed[..found.start()].trim_end(),
            None => trimmed,
        }
    }
}

impl Default for ContentSanitizer {
    fn default() -> Self {
        Self::from_config(&SanitizerConfig::default())
    }
}
