//! Publish worker: drains the broadcast queue and fans out to subscribers.

use std::path::PathBuf;

use gaze_core::messages::BroadcastMessage;
use gaze_core::{GazeError, GazeResult};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub async fn run(
    path: PathBuf,
    mut queue: mpsc::Receiver<BroadcastMessage>,
    mut shutdown: watch::Receiver<bool>,
) -> GazeResult<()> {
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).map_err(GazeError::Io)?;
    info!("Publish worker listening on ipc://{}", path.display());

    let mut subscribers: Vec<UnixStream> = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                if let Ok((stream, _)) = accepted {
                    debug!("subscriber connected");
                    subscribers.push(stream);
                }
            }
            message = queue.recv() => {
                let Some(message) = message else { break };
                let Ok(mut json) = serde_json::to_string(&message) else {
                    warn!("failed to serialize broadcast message");
                    continue;
                };
                json.push('\n');
                subscribers = fan_out(subscribers, json.as_bytes()).await;
            }
        }
    }

    let _ = std::fs::remove_file(&path);
    Ok(())
}

/// Write to every subscriber, dropping the ones that are gone.
async fn fan_out(subscribers: Vec<UnixStream>, data: &[u8]) -> Vec<UnixStream> {
    let mut alive = Vec::with_capacity(subscribers.len());
    for mut stream in subscribers {
        match stream.write_all(data).await {
            Ok(()) => alive.push(stream),
            Err(_) => debug!("subscriber disconnected"),
        }
    }
    alive
}
