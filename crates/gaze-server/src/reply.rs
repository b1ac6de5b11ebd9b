//! Reply worker: newline-delimited JSON over a unix-domain socket, one
//! request at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gaze_core::messages::{Request, Response};
use gaze_core::{GazeError, GazeResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::dispatch::Dispatcher;

/// Receive poll so the worker observes the shutdown signal promptly.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub async fn run(
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) -> GazeResult<()> {
    // A stale socket file from a previous run would fail the bind.
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).map_err(GazeError::Io)?;
    info!("Reply worker listening on ipc://{}", path.display());

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    // Connections are served sequentially; requests are
                    // handled one at a time by construction.
                    Ok((stream, _)) => serve(stream, &dispatcher, &mut shutdown).await,
                    Err(err) => warn!("accept failed: {err}"),
                }
            }
        }
        if *shutdown.borrow() {
            break;
        }
    }

    let _ = std::fs::remove_file(&path);
    Ok(())
}

async fn serve(stream: UnixStream, dispatcher: &Dispatcher, shutdown: &mut watch::Receiver<bool>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = tokio::time::timeout(RECV_TIMEOUT, lines.next_line()) => {
                match line {
                    Err(_) => continue, // receive timeout, poll again
                    Ok(Ok(Some(line))) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let response = match serde_json::from_str::<Request>(&line) {
                            Ok(request) => dispatcher.dispatch(request).await,
                            Err(err) => {
                                warn!("failed to parse request: {err}");
                                Response::from_error(&GazeError::BadFormat(err.to_string()))
                            }
                        };
                        if write_response(&mut writer, &response).await.is_err() {
                            break;
                        }
                    }
                    Ok(Ok(None)) => break, // client disconnected
                    Ok(Err(err)) => {
                        warn!("read failed: {err}");
                        break;
                    }
                }
            }
        }
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> std::io::Result<()> {
    let mut json = serde_json::to_string(response).unwrap_or_else(|_| {
        // Serialization of a Response cannot realistically fail, but nothing
        // may silently drop.
        r#"{"success":false,"error_code":2,"error_message":"serialization failed","payload":""}"#
            .to_string()
    });
    json.push('\n');
    writer.write_all(json.as_bytes()).await
}
