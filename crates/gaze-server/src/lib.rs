//! Control plane: request/reply dispatch and broadcast fan-out over
//! unix-domain sockets.
//!
//! The server owns a small tokio runtime with two workers. The reply worker
//! serves one newline-delimited JSON request at a time and polls its socket
//! with a short timeout so the shutdown signal is observed promptly. The
//! publish worker drains the broadcast queue and fans messages out to every
//! connected subscriber; socket I/O never blocks the emitting subsystem.

pub mod dispatch;
mod publish;
mod reply;

pub use dispatch::Dispatcher;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gaze_core::messages::BroadcastMessage;
use gaze_core::{GazeError, GazeResult};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub reply_path: PathBuf,
    pub publish_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            reply_path: PathBuf::from("/tmp/gaze-rt-rep.sock"),
            publish_path: PathBuf::from("/tmp/gaze-rt-pub.sock"),
        }
    }
}

pub struct ControlServer {
    runtime: tokio::runtime::Runtime,
    shutdown_tx: watch::Sender<bool>,
}

impl ControlServer {
    /// Bind both sockets and start the workers.
    pub fn start(
        config: ServerConfig,
        dispatcher: Dispatcher,
        broadcast_rx: mpsc::Receiver<BroadcastMessage>,
    ) -> GazeResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("control")
            .enable_all()
            .build()
            .map_err(GazeError::Io)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Arc::new(dispatcher);

        let reply_shutdown = shutdown_rx.clone();
        let reply_path = config.reply_path.clone();
        runtime.spawn(async move {
            if let Err(err) = reply::run(reply_path, dispatcher, reply_shutdown).await {
                error!("reply worker failed: {err}");
            }
        });

        let publish_path = config.publish_path.clone();
        runtime.spawn(async move {
            if let Err(err) = publish::run(publish_path, broadcast_rx, shutdown_rx).await {
                error!("publish worker failed: {err}");
            }
        });

        info!(
            "Control plane on ipc://{} (rep) and ipc://{} (pub)",
            config.reply_path.display(),
            config.publish_path.display()
        );
        Ok(Self {
            runtime,
            shutdown_tx,
        })
    }

    /// Signal both workers and wind the runtime down.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.runtime.shutdown_timeout(Duration::from_secs(2));
        info!("Control plane stopped");
    }
}
