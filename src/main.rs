use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use feed_relay::bot::{DeliveryRouter, TelegramSink};
use feed_relay::config::{Settings, SourceSettings};
use feed_relay::http_utils::create_http_client;
use feed_relay::media::MediaAcquirer;
use feed_relay::relay::Relay;
use feed_relay::storage::{SeenStore, StatePaths};
use feed_relay::{feed, utils};
use regex::Regex;
use reqwest::Client as HttpClient;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting feed relay...");

    let settings = init_settings();
    let sources = settings.source_list();
    if sources.is_empty() {
        bail!("No sources configured; set FEEDS or add [[sources]] to config");
    }

    let client = create_http_client(settings.http_timeout(), &settings.user_agent);
    let sink = TelegramSink::new(
        &settings.telegram_token,
        &settings.chat_id,
        settings.sink_timeout(),
    )
    .context("Failed to build Telegram client")?;
    let relay = Relay::new(
        MediaAcquirer::from_settings(&settings, &client),
        DeliveryRouter::new(Arc::new(sink)),
        settings.send_delay(),
        settings.seen_max_entries,
    );
    info!(
        sources = sources.len(),
        max_media = %utils::format_bytes(settings.media_max_bytes),
        "Relay ready"
    );

    tokio::select! {
        result = run_sources(&relay, &settings, &sources, &client) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, delivered items are already persisted");
            Ok(())
        }
    }
}

async fn run_sources(
    relay: &Relay,
    settings: &Settings,
    sources: &[SourceSettings],
    client: &HttpClient,
) -> Result<()> {
    let mut failures = 0usize;
    for source in sources {
        let paths = StatePaths::for_source(&settings.data_path(), &source.name);
        if settings.clear_seen_on_start {
            clear_seen(&paths, settings.seen_max_entries);
        }

        let feed = feed::from_settings(source, client);
        match relay.run(feed.as_ref(), &paths).await {
            Ok(report) => info!(
                source = %report.source,
                fetched = report.fetched,
                fresh = report.fresh,
                delivered = report.delivered,
                failed = report.failed.len(),
                "Source done"
            ),
            Err(e) => {
                error!(source = %source.name, error = %e, "Source run failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} sources failed", sources.len());
    }
    Ok(())
}

fn clear_seen(paths: &StatePaths, max_entries: usize) {
    let mut store = SeenStore::load(&paths.seen, max_entries);
    match store.reset() {
        Ok(()) => warn!(path = %paths.seen.display(), "Cleared seen store on start"),
        Err(e) => error!(path = %paths.seen.display(), error = %e, "Failed to clear seen store"),
    }
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
