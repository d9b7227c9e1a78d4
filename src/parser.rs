//! Resilient JSON parser (§4.4): turn free-form LLM text into a typed value
//! via a fixed four-strategy ladder, committing to the first success.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::truncate;

const DEFAULT_MAX_INPUT_SIZE: usize = 10 * 1024 * 1024;
const PREVIEW_LEN: usize = 200;

/// Options recognized by [`parse`] (§4.4). Defaults match the spec exactly.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub context: String,
    pub enable_cleanup: bool,
    pub log_errors: bool,
    pub max_input_size: usize,
}

impl ParseOptions {
    pub fn new(context: impl Into<String>) -> Self {
        Self { context: context.into(), enable_cleanup: true, log_errors: true, max_input_size: DEFAULT_MAX_INPUT_SIZE }
    }

    pub fn enable_cleanup(mut self, enabled: bool) -> Self {
        self.enable_cleanup = enabled;
        self
    }

    pub fn log_errors(mut self, enabled: bool) -> Self {
        self.log_errors = enabled;
        self
    }

    pub fn max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new("parse")
    }
}

/// Discriminated parse outcome (§3 "Parse result"). Never a panic.
#[derive(Debug, Clone)]
pub enum ParseResult<T> {
    Success { value: T, original_text: String },
    Failure { error_message: String, original_text: String },
}

impl<T> ParseResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseResult::Success { .. })
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            ParseResult::Success { value, .. } => Some(value),
            ParseResult::Failure { .. } => None,
        }
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|javascript|js)?\s*\n?(.*?)\n?```").unwrap())
}

fn single_backtick_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^`(.*)`$").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").unwrap())
}

fn unquoted_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)(\s*:)"#).unwrap())
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//[^\n]*").unwrap())
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

/// Parse `text` into a `T`, per the §4.4 strategy ladder. Never panics;
/// exceeding `options.max_input_size` fails fast without attempting any
/// strategy.
pub fn parse<T: DeserializeOwned>(text: &str, options: &ParseOptions) -> ParseResult<T> {
    let original_text = text.to_string();

    if text.len() > options.max_input_size {
        return fail(
            &options.context,
            format!("input size {} exceeds max_input_size {}", text.len(), options.max_input_size),
            original_text,
        );
    }

    let trimmed = text.trim();

    // Strategy 1: direct parse.
    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return ParseResult::Success { value, original_text };
    }
    log_strategy_failure(options, 1, "direct parse failed");

    if !options.enable_cleanup {
        return fail(&options.context, "direct parse failed and cleanup is disabled", original_text);
    }

    // Strategy 2: strip markdown fences.
    let defenced = strip_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<T>(defenced.trim()) {
        return ParseResult::Success { value, original_text };
    }
    log_strategy_failure(options, 2, "fence-stripped parse failed");

    // Strategy 3: cleanup (trailing commas, unquoted keys, comments).
    let cleaned = cleanup(&defenced);
    if let Ok(value) = serde_json::from_str::<T>(cleaned.trim()) {
        return ParseResult::Success { value, original_text };
    }
    log_strategy_failure(options, 3, "cleaned parse failed");

    // Strategy 4: greedy bracket/brace extraction, dispatched on first char.
    if let Some(extracted) = extract(&cleaned) {
        if let Ok(value) = serde_json::from_str::<T>(&extracted) {
            return ParseResult::Success { value, original_text };
        }
    }
    log_strategy_failure(options, 4, "extraction parse failed");

    fail(&options.context, "all parser strategies failed", original_text)
}

fn fail<T>(context: &str, reason: impl Into<String>, original_text: String) -> ParseResult<T> {
    let preview = truncate(&original_text, PREVIEW_LEN);
    ParseResult::Failure {
        error_message: format!("{context}: {}: preview: {preview}", reason.into()),
        original_text,
    }
}

fn log_strategy_failure(options: &ParseOptions, strategy: u8, reason: &str) {
    if options.log_errors {
        tracing::debug!(context = %options.context, strategy, reason, "parser strategy failed");
    }
}

/// Strategy 2: remove a leading/trailing fenced block (with optional
/// `json`/`javascript`/`js` language tag), or a single pair of backticks.
fn strip_fences(text: &str) -> String {
    if let Some(caps) = fence_re().captures(text) {
        return caps[1].to_string();
    }
    if let Some(caps) = single_backtick_re().captures(text) {
        return caps[1].to_string();
    }
    text.to_string()
}

/// Strategy 3: trailing commas, unquoted keys, line/block comments. Never
/// rewrites single quotes.
fn cleanup(text: &str) -> String {
    let no_block_comments = block_comment_re().replace_all(text, "");
    let no_line_comments = line_comment_re().replace_all(&no_block_comments, "");
    let quoted_keys = unquoted_key_re().replace_all(&no_line_comments, r#"$1"$2"$3"#);
    trailing_comma_re().replace_all(&quoted_keys, "$1").into_owned()
}

/// Strategy 4: peek at the first non-whitespace character to decide whether
/// to extract an array or an object span first, then fall back to the other.
fn extract(text: &str) -> Option<String> {
    let first_non_ws = text.trim_start().chars().next()?;
    match first_non_ws {
        '[' => extract_span(text, '[', ']').or_else(|| extract_span(text, '{', '}')),
        '{' => extract_span(text, '{', '}').or_else(|| extract_span(text, '[', ']')),
        _ => extract_span(text, '{', '}').or_else(|| extract_span(text, '[', ']')),
    }
}

/// Extract the greedy outermost `open ... close` span, respecting string
/// literals so braces inside quoted strings don't confuse depth tracking.
fn extract_span(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
