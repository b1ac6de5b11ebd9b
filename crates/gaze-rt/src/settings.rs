//! Application settings.
//!
//! Layered: defaults, then an optional `gaze-rt.toml`, then `GAZE_RT_*`
//! environment overrides, then CLI flags.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directories scanned recursively for plugin artifacts.
    pub plugin_dirs: Vec<PathBuf>,
    /// Where session files are written.
    pub data_dir: PathBuf,
    pub reply_socket: PathBuf,
    pub publish_socket: PathBuf,
    /// Depth of the per-task persistence queue.
    pub writer_queue_capacity: usize,
    pub log_level: String,
}

impl Settings {
    pub fn load(config_path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("plugin_dirs", vec!["plugins"])?
            .set_default("data_dir", "/tmp")?
            .set_default("reply_socket", "/tmp/gaze-rt-rep.sock")?
            .set_default("publish_socket", "/tmp/gaze-rt-pub.sock")?
            .set_default("writer_queue_capacity", 8192i64)?
            .set_default("log_level", "info")?;

        builder = match config_path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("gaze-rt").required(false)),
        };
        builder = builder.add_source(config::Environment::with_prefix("GAZE_RT").separator("__"));

        builder
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
}
