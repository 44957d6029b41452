//! Generic extractor fallback backed by the `yt-dlp` executable
//!
//! Handles hosts that need page scraping or stream assembly. The process
//! writes into a scoped temp dir and prints the final file path.

use super::strategy::{AcquireStrategy, MissReason, StrategyOutcome};
use super::{AcquiredArtifact, TempRoot, Unavailable};
use crate::utils::truncate_str;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Output printed when a download is skipped for exceeding `--max-filesize`
const TOO_LARGE_PATTERNS: &[&str] = &["larger than max-filesize", "File is larger than"];

/// Error patterns meaning the media is gone or unsupported
const FATAL_ERROR_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "This video is private",
    "removed by the uploader",
    "no longer available",
    "This video has been removed",
    "Unsupported URL",
    "is not a valid URL",
    "Unable to extract",
    "No video formats found",
    "There's no video in this",
    "HTTP Error 404",
    "HTTP Error 410",
];

fn is_fatal_ytdlp_error(error_msg: &str) -> bool {
    FATAL_ERROR_PATTERNS
        .iter()
        .any(|pattern| error_msg.contains(pattern))
}

fn is_too_large(output: &str) -> bool {
    TOO_LARGE_PATTERNS.iter().any(|p| output.contains(p))
}

/// Where yt-dlp cookies come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    /// No cookies
    None,
    /// Existing Netscape cookie file
    File(PathBuf),
    /// Cookie file content, written to a scoped temp file per run
    Inline(String),
}

impl CookieSource {
    /// Path takes precedence over inline content; blank values are ignored.
    #[must_use]
    pub fn from_settings(path: Option<&str>, content: Option<&str>) -> Self {
        if let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) {
            return Self::File(PathBuf::from(path));
        }
        match content.filter(|c| !c.trim().is_empty()) {
            Some(content) => Self::Inline(content.to_string()),
            None => Self::None,
        }
    }
}

/// Strategy running `yt-dlp`
pub struct YtdlpExtractor {
    binary: String,
    cookies: CookieSource,
    timeout: Duration,
    temp_root: TempRoot,
}

impl YtdlpExtractor {
    /// Create the strategy
    #[must_use]
    pub fn new(binary: &str, cookies: CookieSource, timeout: Duration, temp_root: TempRoot) -> Self {
        Self {
            binary: binary.to_string(),
            cookies,
            timeout,
            temp_root,
        }
    }

    /// Materialize the cookie file for one run.
    ///
    /// The returned guard keeps an inline cookie file alive until dropped.
    fn cookie_file(&self) -> (Option<PathBuf>, Option<NamedTempFile>) {
        match &self.cookies {
            CookieSource::None => (None, None),
            CookieSource::File(path) => {
                if path.is_file() {
                    (Some(path.clone()), None)
                } else {
                    warn!(path = %path.display(), "yt-dlp cookie file missing, continuing without");
                    (None, None)
                }
            }
            CookieSource::Inline(content) => {
                let written = self
                    .temp_root
                    .create_file("relay-cookies-", ".txt")
                    .and_then(|mut file| {
                        file.write_all(content.as_bytes())?;
                        file.flush()?;
                        Ok(file)
                    });
                match written {
                    Ok(file) => (Some(file.path().to_path_buf()), Some(file)),
                    Err(e) => {
                        warn!(error = %e, "Failed to write yt-dlp cookies, continuing without");
                        (None, None)
                    }
                }
            }
        }
    }
}

fn build_args(url: &Url, output_dir: &Path, max_bytes: u64, cookies: Option<&PathBuf>) -> Vec<String> {
    let template = output_dir.join("%(id).80s.%(ext)s");
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-progress".to_string(),
        "--no-simulate".to_string(),
        "--max-filesize".to_string(),
        max_bytes.to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
    ];
    if let Some(cookies) = cookies {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().to_string());
    }
    args.push(url.to_string());
    args
}

#[async_trait]
impl AcquireStrategy for YtdlpExtractor {
    fn name(&self) -> &'static str {
        "ytdlp"
    }

    fn applies_to(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    async fn attempt(&self, url: &Url, max_bytes: u64) -> StrategyOutcome {
        let dir = match self.temp_root.create_dir("relay-ytdlp-") {
            Ok(dir) => dir,
            Err(e) => return StrategyOutcome::Miss(MissReason::Failed(e.to_string())),
        };
        let (cookie_path, _cookie_guard) = self.cookie_file();
        let args = build_args(url, dir.path(), max_bytes, cookie_path.as_ref());

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                warn!(url = %url, timeout = ?self.timeout, "yt-dlp timed out");
                return StrategyOutcome::Miss(MissReason::Failed("timed out".to_string()));
            }
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(binary = %self.binary, "yt-dlp not installed");
                return StrategyOutcome::Miss(MissReason::NotApplicable);
            }
            Ok(Err(e)) => return StrategyOutcome::Miss(MissReason::Failed(e.to_string())),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_too_large(&stdout) || is_too_large(&stderr) {
            info!(url = %url, "yt-dlp reports media over ceiling");
            return StrategyOutcome::Fatal(Unavailable::TooLarge);
        }
        if !output.status.success() {
            if is_fatal_ytdlp_error(&stderr) {
                return StrategyOutcome::Miss(MissReason::NotFound);
            }
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default();
            return StrategyOutcome::Miss(MissReason::Failed(truncate_str(last.trim(), 300)));
        }

        let Some(path) = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
        else {
            // --print implies --quiet, so a --max-filesize skip is silent and
            // only shows up as a clean exit with nothing downloaded.
            if dir_is_empty(dir.path()).await {
                info!(url = %url, "yt-dlp skipped the download, treating as over ceiling");
                return StrategyOutcome::Fatal(Unavailable::TooLarge);
            }
            return StrategyOutcome::Miss(MissReason::Failed("no output file".to_string()));
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return StrategyOutcome::Miss(MissReason::Failed(format!(
                    "output file missing: {}",
                    path.display()
                )))
            }
        };
        if size > max_bytes {
            return StrategyOutcome::Fatal(Unavailable::TooLarge);
        }

        let declared = mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string());
        StrategyOutcome::Success(AcquiredArtifact::new(dir, path, declared, size, self.name()))
    }
}

async fn dir_is_empty(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
