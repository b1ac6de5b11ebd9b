//! gaze-rt entry point.
//!
//! Assembly and thread ownership:
//!
//! 1. Load settings, initialize tracing, scan plugin directories.
//! 2. Start the pipeline worker, the protocol orchestrator and the control
//!    plane.
//! 3. Run the render loop on this thread — the only thread allowed to touch
//!    the display.
//! 4. On exit, join in reverse of spawn order: orchestrator (which joins any
//!    persistence writer), pipeline, control plane, and finally the window.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gaze_runtime::graphics::{GraphicsRuntime, GraphicsShared};
use gaze_runtime::protocol::PersistenceSettings;
use gaze_runtime::{BroadcastHub, PipelineRuntime, PluginRegistry, ProtocolOrchestrator};
use gaze_server::{ControlServer, Dispatcher, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "gaze-rt", about = "Real-time eye-tracking experiment runtime")]
struct Cli {
    /// Path to a configuration file (default: ./gaze-rt.toml if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Additional plugin directories, scanned after the configured ones.
    #[arg(long = "plugin-dir")]
    plugin_dirs: Vec<PathBuf>,

    /// Override the session data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.plugin_dirs.extend(cli.plugin_dirs);
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    init_tracing(&settings.log_level);
    info!("gaze-rt starting");

    let registry = Arc::new(PluginRegistry::new());
    for dir in &settings.plugin_dirs {
        registry.load_directory(dir);
    }
    for (path, error) in registry.load_errors() {
        info!("plugin load error: {} ({error})", path.display());
    }

    let pipeline = Arc::new(PipelineRuntime::new());
    pipeline.init();

    let (broadcast, broadcast_rx) = BroadcastHub::channel();
    let graphics_shared = Arc::new(GraphicsShared::new());
    let mut graphics =
        GraphicsRuntime::new(graphics_shared.clone(), pipeline.clone(), broadcast.clone());
    graphics.init();

    let orchestrator = ProtocolOrchestrator::spawn(
        registry.clone(),
        pipeline.clone(),
        graphics_shared.clone(),
        broadcast,
        PersistenceSettings {
            data_dir: settings.data_dir.clone(),
            writer_queue_capacity: settings.writer_queue_capacity,
        },
    );

    let dispatcher = Dispatcher::new(
        registry,
        pipeline.clone(),
        graphics_shared,
        orchestrator.handle(),
    );
    let server = ControlServer::start(
        ServerConfig {
            reply_path: settings.reply_socket.clone(),
            publish_path: settings.publish_socket.clone(),
        },
        dispatcher,
        broadcast_rx,
    )
    .context("failed to start control plane")?;

    // The render loop owns this thread until EXIT or window close.
    graphics.run();

    // Tear down in reverse of spawn order; the window goes last so any task
    // shutdown still has a valid GL context.
    orchestrator.shutdown();
    pipeline.shutdown();
    server.shutdown();
    graphics.shutdown();

    info!("gaze-rt stopped");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}
