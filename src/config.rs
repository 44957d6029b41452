//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! relay constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Telegram's upload ceiling for bots (50 MiB)
pub const DEFAULT_MEDIA_MAX_BYTES: u64 = 50 * 1024 * 1024;
/// Pause between two sends to the same chat
pub const DEFAULT_SEND_DELAY_MS: u64 = 1000;
/// Retention ceiling for the seen-item store
pub const DEFAULT_SEEN_MAX_ENTRIES: usize = 10_000;
/// Maximum number of locators fetched for one gallery item
pub const GALLERY_BATCH_CAP: usize = 10;

/// A feed source configured via `[[sources]]` or the `FEEDS` list
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Source name, also names the state directory
    pub name: String,
    /// JSON file path or `http(s)://` URL of the normalized item batch
    pub location: String,
    /// Only relay items whose title contains this keyword (case-insensitive)
    #[serde(default)]
    pub title_keyword: Option<String>,
    /// Skip items posted in these communities (case-insensitive)
    #[serde(default)]
    pub exclude_communities: Vec<String>,
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,
    /// Destination chat: numeric id or `@channel` username
    pub chat_id: String,

    /// Root directory for per-source state
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Where scoped media temp directories are created (system temp if unset)
    pub media_temp_dir: Option<String>,

    /// Byte ceiling for downloaded media
    #[serde(default = "default_media_max_bytes")]
    pub media_max_bytes: u64,
    /// Delay between sends in milliseconds
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    /// Seen store retention ceiling
    #[serde(default = "default_seen_max_entries")]
    pub seen_max_entries: usize,
    /// Wipe each source's seen store before its run
    #[serde(default)]
    pub clear_seen_on_start: bool,

    /// Timeout for media and feed downloads
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Timeout for HEAD probes and API lookups
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Timeout for Telegram calls
    #[serde(default = "default_sink_timeout_secs")]
    pub sink_timeout_secs: u64,
    /// Timeout for one yt-dlp invocation
    #[serde(default = "default_extractor_timeout_secs")]
    pub extractor_timeout_secs: u64,
    /// User agent for outgoing HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Enable the Redgifs extractor
    #[serde(default = "default_true")]
    pub allow_redgifs: bool,
    /// Redgifs API base URL
    #[serde(default = "default_redgifs_api_base")]
    pub redgifs_api_base: String,
    /// Enable the yt-dlp fallback
    #[serde(default = "default_true")]
    pub allow_ytdlp: bool,
    /// yt-dlp executable
    #[serde(default = "default_ytdlp_binary")]
    pub ytdlp_binary: String,
    /// Netscape cookie file passed to yt-dlp
    pub ytdlp_cookies_path: Option<String>,
    /// Raw cookie file content, used when no path is set
    pub ytdlp_cookies_content: Option<String>,

    /// Feeds as `name=location` pairs separated by `,`, `;` or whitespace
    pub feeds: Option<String>,
    /// Feeds with filters, from config files
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

fn default_data_dir() -> String {
    "data".to_string()
}

const fn default_media_max_bytes() -> u64 {
    DEFAULT_MEDIA_MAX_BYTES
}

const fn default_send_delay_ms() -> u64 {
    DEFAULT_SEND_DELAY_MS
}

const fn default_seen_max_entries() -> usize {
    DEFAULT_SEEN_MAX_ENTRIES
}

const fn default_http_timeout_secs() -> u64 {
    30
}

const fn default_probe_timeout_secs() -> u64 {
    10
}

const fn default_sink_timeout_secs() -> u64 {
    60
}

const fn default_extractor_timeout_secs() -> u64 {
    120
}

fn default_user_agent() -> String {
    format!("feed-relay/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_true() -> bool {
    true
}

fn default_redgifs_api_base() -> String {
    "https://api.redgifs.com".to_string()
}

fn default_ytdlp_binary() -> String {
    "yt-dlp".to_string()
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain env vars, UPPER_SNAKE_CASE maps to snake_case; empty means unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use feed_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Env vars that config may not map (mixed case, empty strings)
        if settings.ytdlp_cookies_path.is_none() {
            settings.ytdlp_cookies_path = non_empty_env("YTDLP_COOKIES_PATH");
        }
        if settings.ytdlp_cookies_content.is_none() {
            settings.ytdlp_cookies_content = non_empty_env("YTDLP_COOKIES_CONTENT");
        }
        if settings.feeds.is_none() {
            settings.feeds = non_empty_env("FEEDS");
        }

        Ok(settings)
    }

    /// All configured sources: `[[sources]]` tables first, then `feeds` pairs.
    ///
    /// Pairs without `=` or with an empty side are skipped, as are names
    /// already defined by a table.
    #[must_use]
    pub fn source_list(&self) -> Vec<SourceSettings> {
        let mut sources = self.sources.clone();
        let pairs = self
            .feeds
            .as_deref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|token| token.split_once('='))
                    .map(|(name, location)| (name.trim(), location.trim()))
                    .filter(|(name, location)| !name.is_empty() && !location.is_empty())
                    .map(|(name, location)| (name.to_string(), location.to_string()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for (name, location) in pairs {
            if sources.iter().any(|s| s.name == name) {
                continue;
            }
            sources.push(SourceSettings {
                name,
                location,
                title_keyword: None,
                exclude_communities: Vec::new(),
            });
        }
        sources
    }

    /// Root directory for per-source state
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Parent for scoped media temp dirs, `None` means the system default
    #[must_use]
    pub fn media_temp_path(&self) -> Option<PathBuf> {
        self.media_temp_dir
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    /// Pause between sends
    #[must_use]
    pub const fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    /// Timeout for downloads
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Timeout for probes and API lookups
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Timeout for Telegram calls
    #[must_use]
    pub const fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_secs)
    }

    /// Timeout for one yt-dlp run
    #[must_use]
    pub const fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_secs)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn bare_settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            chat_id: "1".to_string(),
            data_dir: default_data_dir(),
            media_temp_dir: None,
            media_max_bytes: DEFAULT_MEDIA_MAX_BYTES,
            send_delay_ms: DEFAULT_SEND_DELAY_MS,
            seen_max_entries: DEFAULT_SEEN_MAX_ENTRIES,
            clear_seen_on_start: false,
            http_timeout_secs: 30,
            probe_timeout_secs: 10,
            sink_timeout_secs: 60,
            extractor_timeout_secs: 120,
            user_agent: default_user_agent(),
            allow_redgifs: true,
            redgifs_api_base: default_redgifs_api_base(),
            allow_ytdlp: true,
            ytdlp_binary: default_ytdlp_binary(),
            ytdlp_cookies_path: None,
            ytdlp_cookies_content: None,
            feeds: None,
            sources: Vec::new(),
        }
    }

    // Only test touching the process environment, to avoid races
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("CHAT_ID", "@relay_channel");
        env::set_var("MEDIA_MAX_BYTES", "1024");
        env::set_var("YTDLP_COOKIES_PATH", "");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(settings.chat_id, "@relay_channel");
        assert_eq!(settings.media_max_bytes, 1024);
        assert_eq!(settings.seen_max_entries, DEFAULT_SEEN_MAX_ENTRIES);
        assert!(settings.allow_redgifs);
        assert_eq!(settings.ytdlp_cookies_path, None);

        env::remove_var("TELEGRAM_TOKEN");
        env::remove_var("CHAT_ID");
        env::remove_var("MEDIA_MAX_BYTES");
        env::remove_var("YTDLP_COOKIES_PATH");
        Ok(())
    }

    #[test]
    fn test_feed_list_parsing() {
        let mut settings = bare_settings();

        settings.feeds = Some("reddit=data/reddit.json, hocean=https://feeds.test/h".to_string());
        let sources = settings.source_list();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "reddit");
        assert_eq!(sources[0].location, "data/reddit.json");
        assert_eq!(sources[1].location, "https://feeds.test/h");

        settings.feeds = Some("a=1; broken b= ;c=3".to_string());
        let names: Vec<String> = settings.source_list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_tables_take_precedence_over_pairs() {
        let mut settings = bare_settings();
        settings.sources = vec![SourceSettings {
            name: "reddit".to_string(),
            location: "from-table.json".to_string(),
            title_keyword: Some("f4".to_string()),
            exclude_communities: vec!["gonewildaudio".to_string()],
        }];
        settings.feeds = Some("reddit=from-env.json".to_string());

        let sources = settings.source_list();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].location, "from-table.json");
    }

    #[test]
    fn test_empty_temp_dir_means_system_default() {
        let mut settings = bare_settings();
        settings.media_temp_dir = Some(String::new());
        assert_eq!(settings.media_temp_path(), None);
        settings.media_temp_dir = Some("/var/tmp/relay".to_string());
        assert_eq!(
            settings.media_temp_path(),
            Some(PathBuf::from("/var/tmp/relay"))
        );
    }
}
