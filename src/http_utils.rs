//! HTTP utilities shared by feeds and media strategies
//!
//! Builds the common `reqwest` client and recognises HTML pages served in
//! place of real media.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, Response};
use std::time::Duration;
use tracing::warn;

/// Number of leading bytes inspected for markup
pub const SNIFF_LEN: usize = 2048;

/// Creates an HTTP client with the given timeout and user agent.
///
/// Falls back to a default client if the builder fails, so a bad user agent
/// never stops the relay.
#[must_use]
pub fn create_http_client(timeout: Duration, user_agent: &str) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client, using defaults");
            HttpClient::new()
        })
}

/// Declared content type without parameters, lowercased
#[must_use]
pub fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalize_content_type)
        .filter(|s| !s.is_empty())
}

/// Strip parameters such as `; charset=utf-8` and lowercase.
#[must_use]
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether a declared content type describes a web page
#[must_use]
pub fn is_markup_content_type(content_type: &str) -> bool {
    let ct = normalize_content_type(content_type);
    ct == "text/html" || ct == "application/xhtml+xml"
}

/// Detect HTML error pages or watch pages from their first bytes.
///
/// # Examples
///
/// ```
/// use feed_relay::http_utils::looks_like_markup;
/// assert!(looks_like_markup(b"  <!DOCTYPE html><html>"));
/// assert!(!looks_like_markup(&[0xFF, 0xD8, 0xFF, 0xE0]));
/// ```
#[must_use]
pub fn looks_like_markup(head: &[u8]) -> bool {
    let window = &head[..head.len().min(SNIFF_LEN)];
    let lowered = String::from_utf8_lossy(window).to_ascii_lowercase();
    lowered.contains("<!doctype") || lowered.contains("<html") || lowered.contains("<script")
}
