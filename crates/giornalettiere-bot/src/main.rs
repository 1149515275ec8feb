//! Giornalettiere bot: entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use giornalettiere::HttpClient;
use giornalettiere_bot::channel::{self, ChannelUpdater};
use giornalettiere_bot::download::DownloadRequester;
use giornalettiere_bot::fetch::FetchCycle;
use giornalettiere_bot::gateway::{MessagingGateway, TelegramGateway};
use giornalettiere_bot::settings::{Settings, DEFAULT_SETTINGS_PATH};
use giornalettiere_bot::supervisor::{self, WatcherSupervisor};
use giornalettiere_bot::{scheduler, store};

/// How long background tasks get to wind down after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "giornalettiere-bot",
    about = "Publish downloaded newspapers to a Telegram channel",
    version
)]
struct Cli {
    /// Pass `systemd` when started by a systemd unit.
    mode: Option<String>,

    /// Path to the settings file (JSON or TOML).
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let systemd = cli.mode.as_deref() == Some("systemd");

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    // journald stamps every line itself.
    if systemd {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .without_time()
            .init();
        info!("started by systemd");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("cannot load settings: {e:#}");
            std::process::exit(1);
        }
    };
    info!("starting giornalettiere-bot v{}", env!("CARGO_PKG_VERSION"));

    let telegram = Arc::new(TelegramGateway::new(
        &settings.telegram_api_url,
        &settings.telegram_token,
        settings.large_upload_timeout(),
    ));
    match telegram.get_me().await {
        Ok(name) => info!("connected to Telegram as @{name}"),
        Err(e) => warn!("cannot reach Telegram yet: {e}"),
    }
    let gateway: Arc<dyn MessagingGateway> = telegram.clone();

    let updater = Arc::new(ChannelUpdater::new(
        settings.observed_dir(),
        settings.filetypes.clone(),
        settings.recipients(),
        store::open(&settings)?,
        gateway,
    ));

    let shutdown = CancellationToken::new();
    let (settled_tx, settled_rx) = unbounded_channel();
    let consumer = channel::spawn_consumer(updater.clone(), settled_rx, shutdown.clone());

    let watcher = WatcherSupervisor::start(settings.watcher_config(), settled_tx)?;
    let supervision = supervisor::spawn(watcher, settings.liveness_interval(), shutdown.clone());

    let http = HttpClient::new();
    let requester = settings
        .download_site
        .as_deref()
        .map(|site| DownloadRequester::new(http.clone(), site, &settings.download_request));
    let fetch = Arc::new(FetchCycle::new(settings.sites.clone(), http, requester));

    let mut scheduler = scheduler::start_scheduler(
        settings.refresh_interval(),
        settings.fetch_time()?,
        updater.clone(),
        fetch,
    )
    .await?;
    info!("update every {} minute(s)", settings.refresh_rate);

    // Publish whatever arrived while the bot was down.
    let initial = updater.clone();
    tokio::spawn(async move {
        if let Err(e) = initial.update_channel().await {
            error!("initial channel update failed: {e:#}");
        }
    });

    info!("bot started successfully");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    shutdown.cancel();
    telegram.shutdown();
    if let Err(e) = scheduler.shutdown().await {
        warn!("scheduler shutdown failed: {e}");
    }
    for (name, task) in [("consumer", consumer), ("supervisor", supervision)] {
        let abort = task.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("{name} did not stop in time, aborting it");
            abort.abort();
        }
    }

    info!("bye");
    Ok(())
}
