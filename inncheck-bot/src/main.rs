//! inncheck-bot - INN lookup bot
//!
//! Accepts INNs over Telegram, queues them, and answers each with a report
//! built from the EFRSB bankruptcy registry and the Kad.Arbitr case index.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use inncheck_common::config::{LoggingConfig, TomlConfig};
use inncheck_common::events::{BotEvent, EventBus};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use inncheck_bot::admission::Admission;
use inncheck_bot::channel::telegram::TelegramChannel;
use inncheck_bot::channel::Messenger;
use inncheck_bot::fetch::{BrowserSession, EfrsbAdapter, KadArbitrAdapter};
use inncheck_bot::messages;
use inncheck_bot::queue::RequestQueue;
use inncheck_bot::utils::RetryPolicy;
use inncheck_bot::worker::{BankruptcySource, CaseSource, SequentialWorker};

/// Buffered bot events before slow subscribers start lagging
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for inncheck-bot
#[derive(Parser, Debug)]
#[command(name = "inncheck-bot")]
#[command(about = "Telegram bot checking an INN against EFRSB and Kad.Arbitr")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); falls back to INNCHECK_CONFIG, then the platform config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telegram bot token (overrides the config file)
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Maximum number of requests waiting in the queue
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_path) = TomlConfig::resolve(args.config.as_deref())?;
    if let Some(capacity) = args.queue_capacity {
        config.queue.capacity = capacity;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_tracing(&config.logging)?;

    info!("Starting inncheck-bot v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No configuration file found, using built-in defaults"),
    }

    let token = args
        .token
        .or_else(|| config.telegram.token.clone())
        .context("Telegram bot token missing: set TELEGRAM_TOKEN or [telegram] token")?;

    let events = EventBus::new(EVENT_BUS_CAPACITY);
    spawn_event_logger(events.subscribe());

    let telegram = Arc::new(
        TelegramChannel::new(&config.telegram, &token).context("Failed to create Telegram channel")?,
    );
    let messenger = Messenger::new(
        telegram.clone(),
        RetryPolicy::delivery(&config.retry),
        events.clone(),
    );

    let queue = Arc::new(RequestQueue::new(config.queue.capacity));
    info!("Request queue capacity: {}", queue.capacity());

    let admission = Arc::new(Admission::new(
        Arc::clone(&queue),
        messenger.clone(),
        events.clone(),
    ));

    let session = BrowserSession::new(&config.browser).context("Failed to create browser session")?;
    info!("Browser render endpoint: {}", config.browser.render_endpoint);

    let bankruptcy: BankruptcySource = Arc::new(EfrsbAdapter::new(&config.sources)?);
    let cases: CaseSource = Arc::new(KadArbitrAdapter::new(&config.sources)?);
    let worker = SequentialWorker::new(
        session,
        bankruptcy,
        cases,
        messenger.clone(),
        events.clone(),
        RetryPolicy::fetch(&config.retry),
    );

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(Arc::clone(&queue), shutdown.clone()));
    let poller_handle = tokio::spawn(telegram.run_polling(admission, shutdown.clone()));

    shutdown_signal().await;
    shutdown.cancel();

    let pending = queue.close();
    if !pending.is_empty() {
        info!("Notifying {} queued requesters of shutdown", pending.len());
    }
    for request in pending {
        messenger.send(&request.requester, messages::SHUTTING_DOWN).await;
        if let Some(ack) = &request.acknowledgment {
            messenger.delete(ack).await;
        }
    }

    if let Err(e) = poller_handle.await {
        warn!("Telegram poller ended abnormally: {}", e);
    }
    if let Err(e) = worker_handle.await {
        warn!("Worker ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Install the global subscriber: `RUST_LOG` wins, else the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,inncheck_bot={level},inncheck_common={level}",
            level = logging.level
        ))
    });
    let registry = tracing_subscriber::registry().with(filter);

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .try_init()?;
        }
        None => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

/// Forward bot events to the debug log
fn spawn_event_logger(mut rx: broadcast::Receiver<BotEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event_type = event.event_type(), "{}", json),
                    Err(e) => warn!("Failed to serialize {}: {}", event.event_type(), e),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
