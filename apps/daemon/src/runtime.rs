//! Tasks that make up the running daemon: the input pump, the controller
//! actor and the delivery worker.

use std::{sync::Arc, time::Duration};

use matrix_client::{MatrixClient, SendReceipt};
use recognizer::{
    AttemptId, CatalogError, CatalogLoader, GestureCatalog, KeyOutcome, RecognitionController,
};
use storage::Storage;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::input::{parse_line, InputEvent, MonotonicClock, ParseError};

#[derive(Debug)]
pub enum DaemonEvent {
    Input(InputEvent),
    CatalogLoaded {
        attempt: AttemptId,
        result: Result<Arc<GestureCatalog>, CatalogError>,
    },
}

/// Reads protocol lines until EOF.
///
/// With `pace` set, sending is delayed by the gap between consecutive event
/// timestamps so a recorded session replays in real time.
pub async fn pump_lines<R>(
    reader: R,
    clock: &MonotonicClock,
    tx: mpsc::Sender<DaemonEvent>,
    pace: bool,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut last_at: Option<u64> = None;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let event = match parse_line(&line, clock.now_ms()) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(ParseError::UnknownKey(err)) => {
                debug!(line = line_no, error = %err, "skipping unrelated key");
                continue;
            }
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping malformed input line");
                continue;
            }
        };

        if pace {
            let at_ms = event_time(&event);
            if let Some(previous) = last_at {
                let gap = at_ms.saturating_sub(previous);
                if gap > 0 {
                    tokio::time::sleep(Duration::from_millis(gap)).await;
                }
            }
            last_at = Some(at_ms);
        }

        if tx.send(DaemonEvent::Input(event)).await.is_err() {
            warn!("controller stopped; no longer reading input");
            break;
        }
    }

    debug!(lines = line_no, "input closed");
    Ok(())
}

fn event_time(event: &InputEvent) -> u64 {
    match event {
        InputEvent::ScreenOn { at_ms } => *at_ms,
        InputEvent::Key(key) => key.at_ms,
    }
}

/// Owns the controller. Catalog loads run on their own tasks and post back
/// through `events`; the loop ends once every strong sender is gone.
pub async fn run_controller(
    mut controller: RecognitionController,
    loader: Arc<dyn CatalogLoader>,
    mut rx: mpsc::Receiver<DaemonEvent>,
    events: mpsc::WeakSender<DaemonEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            DaemonEvent::Input(InputEvent::ScreenOn { at_ms }) => {
                let attempt = controller.on_screen_on(at_ms);
                let loader = loader.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let result = loader.load().await;
                    match events.upgrade() {
                        Some(tx) => {
                            if tx
                                .send(DaemonEvent::CatalogLoaded { attempt, result })
                                .await
                                .is_err()
                            {
                                debug!(?attempt, "controller stopped; dropping catalog result");
                            }
                        }
                        None => debug!("controller gone before catalog load finished"),
                    }
                });
            }
            DaemonEvent::Input(InputEvent::Key(key)) => {
                let outcome = controller.on_key_event(key);
                match &outcome {
                    KeyOutcome::Ignored => {}
                    KeyOutcome::Matched { gesture, .. } => {
                        info!(gesture = %gesture, "gesture recognized")
                    }
                    other => debug!(key = %key.key, outcome = ?other, "key processed"),
                }
            }
            DaemonEvent::CatalogLoaded { attempt, result } => {
                controller.on_catalog_loaded(attempt, result);
            }
        }
    }
    debug!("controller loop finished");
}

/// Sends queued messages one at a time until the dispatcher side is dropped.
pub async fn run_dispatch_worker(storage: Storage, mut rx: mpsc::Receiver<String>) {
    while let Some(message) = rx.recv().await {
        match deliver(&storage, &message).await {
            Ok(receipt) => info!(
                event_id = %receipt.event_id,
                refreshed = receipt.refreshed,
                "matched message delivered"
            ),
            Err(err) => warn!(error = %err, "failed to deliver matched message"),
        }
    }
    debug!("dispatch worker finished");
}

/// Reads the account from storage at send time so tokens rotated by earlier
/// sends or by the tools binary are picked up.
pub async fn deliver(storage: &Storage, message: &str) -> anyhow::Result<SendReceipt> {
    let data = storage.load().await?;
    let config = data
        .matrix
        .ok_or_else(|| anyhow::anyhow!("no matrix account configured"))?;

    let mut client = MatrixClient::for_dispatch(&config)?;
    let receipt = client.send_to_target(message).await?;

    if receipt.refreshed {
        if let Err(err) = storage.update_matrix_config(client.config()).await {
            warn!(error = %err, "failed to persist refreshed tokens");
        }
    }
    Ok(receipt)
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
