//! Redgifs extractor
//!
//! Watch pages on the Redgifs host family only serve HTML, so the direct
//! fetch misses on them. This strategy resolves the gif id through the public
//! API (temporary token, then lookup), probes each ranked rendition with a
//! HEAD request and streams the first usable one.

use super::direct::{stream_to_temp, DownloadLabel};
use super::strategy::{AcquireStrategy, MissReason, StrategyOutcome};
use super::{TempRoot, Unavailable};
use crate::http_utils::is_markup_content_type;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Rendition keys in preference order
const RENDITION_ORDER: &[&str] = &["hd", "sd"];

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct GifResponse {
    gif: GifInfo,
}

#[derive(Deserialize)]
struct GifInfo {
    #[serde(default)]
    urls: serde_json::Map<String, serde_json::Value>,
}

/// Result of probing one candidate
#[derive(Debug, PartialEq, Eq)]
enum Probe {
    Usable,
    TooLarge,
    Skip(String),
}

/// API-backed extractor for the Redgifs host family
pub struct RedgifsExtractor {
    client: HttpClient,
    api_base: String,
    probe_timeout: Duration,
    temp_root: TempRoot,
}

impl RedgifsExtractor {
    /// Create the strategy against `api_base` (normally `https://api.redgifs.com`)
    #[must_use]
    pub fn new(
        client: HttpClient,
        api_base: &str,
        probe_timeout: Duration,
        temp_root: TempRoot,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            probe_timeout,
            temp_root,
        }
    }

    async fn fetch_token(&self) -> Result<String, MissReason> {
        let response = self
            .client
            .get(format!("{}/v2/auth/temporary", self.api_base))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| MissReason::Failed(format!("token request: {e}")))?;
        if !response.status().is_success() {
            return Err(MissReason::Failed(format!(
                "token request: HTTP {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| MissReason::Failed(format!("token response: {e}")))?;
        Ok(body.token)
    }

    async fn lookup(&self, id: &str, token: &str) -> Result<Vec<String>, MissReason> {
        let response = self
            .client
            .get(format!("{}/v2/gifs/{id}", self.api_base))
            .bearer_auth(token)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| MissReason::Failed(format!("lookup: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(MissReason::NotFound),
            status if !status.is_success() => {
                return Err(MissReason::Failed(format!("lookup: HTTP {status}")));
            }
            _ => {}
        }

        let body: GifResponse = response
            .json()
            .await
            .map_err(|e| MissReason::Failed(format!("lookup response: {e}")))?;
        Ok(ranked_candidates(&body.gif))
    }

    async fn probe(&self, candidate: &Url, max_bytes: u64) -> Probe {
        if is_watch_page(candidate) {
            return Probe::Skip("watch page".to_string());
        }

        let response = match self
            .client
            .head(candidate.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Probe::Skip(e.to_string()),
        };
        if !response.status().is_success() {
            return Probe::Skip(format!("HTTP {}", response.status()));
        }

        let is_markup = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_markup_content_type);
        if is_markup {
            return Probe::Skip("markup".to_string());
        }
        match response.content_length() {
            Some(len) if len > max_bytes => Probe::TooLarge,
            _ => Probe::Usable,
        }
    }
}

#[async_trait]
impl AcquireStrategy for RedgifsExtractor {
    fn name(&self) -> &'static str {
        "redgifs"
    }

    fn applies_to(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.to_ascii_lowercase().contains("redgif"))
    }

    async fn attempt(&self, url: &Url, max_bytes: u64) -> StrategyOutcome {
        let Some(id) = gif_id(url) else {
            return StrategyOutcome::Miss(MissReason::NotApplicable);
        };

        let token = match self.fetch_token().await {
            Ok(token) => token,
            Err(reason) => return StrategyOutcome::Miss(reason),
        };
        let candidates = match self.lookup(&id, &token).await {
            Ok(c) if !c.is_empty() => c,
            Ok(_) => return StrategyOutcome::Miss(MissReason::NotFound),
            Err(reason) => return StrategyOutcome::Miss(reason),
        };
        debug!(gif_id = %id, candidates = candidates.len(), "Resolved Redgifs renditions");

        for raw in candidates {
            let Ok(candidate) = Url::parse(&raw) else {
                continue;
            };
            match self.probe(&candidate, max_bytes).await {
                Probe::TooLarge => {
                    info!(gif_id = %id, url = %candidate, "Redgifs rendition over ceiling");
                    return StrategyOutcome::Fatal(Unavailable::TooLarge);
                }
                Probe::Skip(reason) => {
                    debug!(url = %candidate, reason = %reason, "Skipping Redgifs candidate");
                    continue;
                }
                Probe::Usable => {}
            }

            let response = match self.client.get(candidate.clone()).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(url = %candidate, error = %e, "Redgifs download failed");
                    continue;
                }
            };
            let label = DownloadLabel {
                prefix: "relay-redgifs-",
                source: self.name(),
            };
            match stream_to_temp(response, &candidate, max_bytes, &self.temp_root, label).await {
                StrategyOutcome::Miss(reason) => {
                    debug!(url = %candidate, reason = %reason, "Redgifs candidate missed");
                }
                outcome => return outcome,
            }
        }

        StrategyOutcome::Miss(MissReason::Failed(
            "no usable Redgifs rendition".to_string(),
        ))
    }
}

/// Gif id from `/watch/<id>`, `/ifr/<id>`, `/i/<id>` or `/gifs/[detail/]<id>`.
fn gif_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let marker = segments
        .iter()
        .position(|s| matches!(*s, "watch" | "ifr" | "i" | "gifs"))?;

    let mut rest = segments[marker + 1..].iter();
    let mut id = *rest.next()?;
    if id == "detail" {
        id = *rest.next()?;
    }
    let id = id.split('.').next().unwrap_or_default().to_ascii_lowercase();
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')).then_some(id)
}

fn ranked_candidates(gif: &GifInfo) -> Vec<String> {
    RENDITION_ORDER
        .iter()
        .filter_map(|key| gif.urls.get(*key))
        .filter_map(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_watch_page(url: &Url) -> bool {
    url.path().contains("/watch/")
}
