//! Direct transport fetch
//!
//! Streams a locator straight to disk, enforcing the byte ceiling while
//! reading and rejecting HTML pages served in place of media.

use super::strategy::{AcquireStrategy, MissReason, StrategyOutcome};
use super::{AcquiredArtifact, TempRoot, Unavailable};
use crate::http_utils::{content_type, is_markup_content_type, looks_like_markup, SNIFF_LEN};
use async_trait::async_trait;
use futures_util::StreamExt;
use lazy_regex::regex_replace_all;
use reqwest::{Client as HttpClient, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

/// Plain HTTP(S) download
pub struct DirectFetch {
    client: HttpClient,
    temp_root: TempRoot,
}

impl DirectFetch {
    /// Create the strategy
    #[must_use]
    pub const fn new(client: HttpClient, temp_root: TempRoot) -> Self {
        Self { client, temp_root }
    }
}

#[async_trait]
impl AcquireStrategy for DirectFetch {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn applies_to(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    async fn attempt(&self, url: &Url, max_bytes: u64) -> StrategyOutcome {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "Direct request failed");
                return StrategyOutcome::Miss(MissReason::Failed(e.to_string()));
            }
        };
        stream_to_temp(
            response,
            url,
            max_bytes,
            &self.temp_root,
            DownloadLabel {
                prefix: "relay-direct-",
                source: self.name(),
            },
        )
        .await
    }
}

/// Temp dir prefix and artifact provenance for a download
#[derive(Debug, Clone, Copy)]
pub(crate) struct DownloadLabel {
    pub(crate) prefix: &'static str,
    pub(crate) source: &'static str,
}

/// Stream an HTTP response into a scoped temp dir with the byte ceiling.
///
/// The temp dir is dropped, and with it any partial file, on every outcome
/// except `Success`.
pub(crate) async fn stream_to_temp(
    response: Response,
    url: &Url,
    max_bytes: u64,
    temp_root: &TempRoot,
    label: DownloadLabel,
) -> StrategyOutcome {
    let status = response.status();
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return StrategyOutcome::Miss(MissReason::NotFound);
    }
    if !status.is_success() {
        return StrategyOutcome::Miss(MissReason::Failed(format!("HTTP {status}")));
    }

    let declared = content_type(&response);
    if declared.as_deref().is_some_and(is_markup_content_type) {
        debug!(url = %url, content_type = ?declared, "Markup content type, skipping");
        return StrategyOutcome::Miss(MissReason::Markup);
    }
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            debug!(url = %url, declared_len = len, max_bytes, "Declared size over ceiling");
            return StrategyOutcome::Fatal(Unavailable::TooLarge);
        }
    }

    let dir = match temp_root.create_dir(label.prefix) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "Failed to create media temp dir");
            return StrategyOutcome::Miss(MissReason::Failed(e.to_string()));
        }
    };
    let path = dir.path().join(file_name_for(url, declared.as_deref()));
    let mut file = match tokio::fs::File::create(&path).await {
        Ok(file) => file,
        Err(e) => return StrategyOutcome::Miss(MissReason::Failed(e.to_string())),
    };

    let mut written: u64 = 0;
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(url = %url, error = %e, "Media stream interrupted");
                return StrategyOutcome::Miss(MissReason::Failed(e.to_string()));
            }
        };

        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            debug!(url = %url, written, max_bytes, "Streamed size over ceiling, discarding");
            return StrategyOutcome::Fatal(Unavailable::TooLarge);
        }

        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            if head.len() == SNIFF_LEN && looks_like_markup(&head) {
                return StrategyOutcome::Miss(MissReason::Markup);
            }
        }

        if let Err(e) = file.write_all(&chunk).await {
            return StrategyOutcome::Miss(MissReason::Failed(e.to_string()));
        }
    }

    if let Err(e) = file.flush().await {
        return StrategyOutcome::Miss(MissReason::Failed(e.to_string()));
    }
    drop(file);

    if written == 0 {
        return StrategyOutcome::Miss(MissReason::Failed("empty body".to_string()));
    }
    if looks_like_markup(&head) {
        return StrategyOutcome::Miss(MissReason::Markup);
    }

    StrategyOutcome::Success(AcquiredArtifact::new(
        dir,
        path,
        declared,
        written,
        label.source,
    ))
}

/// Local file name from the URL path, or `media.<ext>` from the content type.
fn file_name_for(url: &Url, declared: Option<&str>) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| name.contains('.'))
        .map(|name| regex_replace_all!(r"[^A-Za-z0-9._-]", name, "_").to_string())
        .filter(|name| !name.starts_with('.') && name.len() <= 128);

    from_path.unwrap_or_else(|| {
        let ext = declared
            .and_then(mime_guess::get_mime_extensions_str)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        format!("media.{ext}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_path() {
        let url = Url::parse("https://i.redd.it/abc123.jpg?width=640").expect("url");
        assert_eq!(file_name_for(&url, Some("image/jpeg")), "abc123.jpg");
    }

    #[test]
    fn test_file_name_from_content_type() {
        let url = Url::parse("https://cdn.test/media/7f3e").expect("url");
        let name = file_name_for(&url, Some("image/png"));
        assert_eq!(name, "media.png");
        assert_eq!(file_name_for(&url, None), "media.bin");
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let url = Url::parse("https://cdn.test/a%20b%3B.gif").expect("url");
        let name = file_name_for(&url, None);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c)));
        assert!(name.ends_with(".gif"));
    }

    #[test]
    fn test_applies_only_to_http() {
        let strategy = DirectFetch::new(HttpClient::new(), TempRoot::default());
        assert!(strategy.applies_to(&Url::parse("https://a.test/x").expect("url")));
        assert!(!strategy.applies_to(&Url::parse("ftp://a.test/x").expect("url")));
    }
}
