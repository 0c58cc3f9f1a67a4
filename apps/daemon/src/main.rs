use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use recognizer::{
    CatalogLoader, ControllerConfig, LogHaptics, QueuedDispatcher, RecognitionController,
    StoredCatalogLoader,
};
use storage::Storage;
use tokio::{
    fs::File,
    io::{self, BufReader},
    sync::mpsc,
};
use tracing::info;

mod config;
mod input;
mod logging;
mod runtime;

use input::MonotonicClock;
use runtime::{pump_lines, run_controller, run_dispatch_worker};

#[derive(Parser, Debug)]
#[command(about = "Recognizes volume-key gestures and relays their messages to Matrix")]
struct Args {
    /// Settings file; defaults to ./gesture-relay.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the data file from settings.
    #[arg(long)]
    data_path: Option<PathBuf>,
    /// Replays a recorded event file in real time instead of reading stdin.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(path) = args.data_path {
        settings.data_path = path;
    }
    logging::init(&settings)?;

    info!(
        data_path = %settings.data_path.display(),
        start_timeout_ms = settings.start_timeout_ms,
        "starting gesture relay"
    );

    let storage = Storage::open(&settings.data_path);
    let (dispatcher, outbox) = QueuedDispatcher::channel(settings.dispatch_queue);
    let worker = tokio::spawn(run_dispatch_worker(storage.clone(), outbox));

    let controller = RecognitionController::new(
        ControllerConfig {
            start_timeout: Duration::from_millis(settings.start_timeout_ms),
        },
        Arc::new(dispatcher),
        Arc::new(LogHaptics),
    );
    let loader: Arc<dyn CatalogLoader> = Arc::new(StoredCatalogLoader::new(storage));

    let (tx, rx) = mpsc::channel(64);
    let actor = tokio::spawn(run_controller(controller, loader, rx, tx.downgrade()));

    let clock = MonotonicClock::start();
    match &args.events {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open events file '{}'", path.display()))?;
            pump_lines(BufReader::new(file), &clock, tx, true).await?;
        }
        None => pump_lines(BufReader::new(io::stdin()), &clock, tx, false).await?,
    }

    // Closing input stops the actor, which drops the dispatcher and lets the
    // worker drain the outbox.
    actor.await.context("controller task failed")?;
    worker.await.context("dispatch worker failed")?;
    info!("gesture relay stopped");
    Ok(())
}
