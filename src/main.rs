use dotenvy::dotenv;
use grafana_unfurl::app::App;
use grafana_unfurl::cleanup::RetentionSweeper;
use grafana_unfurl::config::{
    RetentionWindow, Settings, PENDING_SELECTION_MAX_ENTRIES, PENDING_SELECTION_TTL_SECS,
};
use grafana_unfurl::grafana::api::GrafanaApi;
use grafana_unfurl::grafana::render::Renderer;
use grafana_unfurl::pending::PendingSelections;
use grafana_unfurl::server;
use grafana_unfurl::slack::client::SlackClient;
use grafana_unfurl::storage::ImageStore;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data from log output
struct RedactionPatterns {
    slack_token: Regex,
    s3_key: Regex,
    s3_secret: Regex,
    s3_signing_key: Regex,
    s3_signing_secret: Regex,
    presign_signature: Regex,
    presign_credential: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            slack_token: Regex::new(r"xox[a-z]-[0-9A-Za-z-]+")?,
            s3_key: Regex::new(r"S3_ACCESS_KEY_ID=[^\s&]+")?,
            s3_secret: Regex::new(r"S3_SECRET_ACCESS_KEY=[^\s&]+")?,
            s3_signing_key: Regex::new(r"S3_URL_SIGNING_ACCESS_KEY_ID=[^\s&]+")?,
            s3_signing_secret: Regex::new(r"S3_URL_SIGNING_SECRET_ACCESS_KEY=[^\s&]+")?,
            presign_signature: Regex::new(r"X-Amz-Signature=[0-9a-fA-F]+")?,
            presign_credential: Regex::new(r"X-Amz-Credential=[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .slack_token
            .replace_all(&output, "[SLACK_TOKEN]")
            .to_string();
        output = self
            .s3_key
            .replace_all(&output, "S3_ACCESS_KEY_ID=[MASKED]")
            .to_string();
        output = self
            .s3_secret
            .replace_all(&output, "S3_SECRET_ACCESS_KEY=[MASKED]")
            .to_string();
        output = self
            .s3_signing_key
            .replace_all(&output, "S3_URL_SIGNING_ACCESS_KEY_ID=[MASKED]")
            .to_string();
        output = self
            .s3_signing_secret
            .replace_all(&output, "S3_URL_SIGNING_SECRET_ACCESS_KEY=[MASKED]")
            .to_string();
        output = self
            .presign_signature
            .replace_all(&output, "X-Amz-Signature=[MASKED]")
            .to_string();
        output = self
            .presign_credential
            .replace_all(&output, "X-Amz-Credential=[MASKED]")
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
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
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
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting grafana-unfurl...");

    // Load settings
    let settings = init_settings();
    debug!("Configuration loaded: {:?}", settings.masked());

    let window = init_retention_window(&settings);

    // Initialize storage
    let store = init_storage(&settings, window).await;

    let app = Arc::new(App {
        grafana: GrafanaApi::new(&settings),
        renderer: Renderer::new(Arc::clone(&settings)),
        slack: SlackClient::new(&settings),
        pending: PendingSelections::new(PENDING_SELECTION_TTL_SECS, PENDING_SELECTION_MAX_ENTRIES),
        store: Arc::clone(&store),
        settings,
    });

    // Start the retention sweeper
    let shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::new(store, window);
    let sweeper_handle = sweeper.spawn(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&app.settings.listen_addr).await?;
    info!("Listening on {}", app.settings.listen_addr);

    axum::serve(listener, server::router(Arc::clone(&app)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        error!("Retention sweeper task failed to join: {e}");
    }
    info!("Shutdown complete");

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_retention_window(settings: &Settings) -> RetentionWindow {
    match settings.retention_window() {
        Ok(window) => window,
        Err(e) => {
            error!("Failed to resolve retention configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_storage(settings: &Settings, window: RetentionWindow) -> Arc<ImageStore> {
    match ImageStore::new(settings, window.retention).await {
        Ok(s) => {
            info!("Image storage initialized.");
            if s.check_connection().await.is_ok() {
                // Success message already logged in check_connection
            } else {
                error!("Image storage connection check returned error.");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize image storage: {}", e);
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
}
