//! Synthetic eye-data source.
//!
//! Produces a smooth circular gaze trajectory at a configurable rate so the
//! rest of the runtime can be exercised without tracker hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gaze_core::{EyeSample, GazeResult, Vec2};
use gaze_plugin_api::{
    export_plugin, make_version, ConfigSlot, Configurable, EyePlugin, EyeSource, SourceQueue,
};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct SourceConfig {
    sample_rate_hz: u32,
    /// Radius of the synthetic gaze circle, in pixels.
    amplitude_px: f32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1000,
            amplitude_px: 120.0,
        }
    }
}

pub struct DummySource {
    queue: Arc<SourceQueue<EyeSample>>,
    config: ConfigSlot<SourceConfig>,
    running: Arc<AtomicBool>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DummySource {
    fn default() -> Self {
        Self {
            queue: Arc::new(SourceQueue::new(1024)),
            config: ConfigSlot::new(),
            running: Arc::new(AtomicBool::new(false)),
            producer: Mutex::new(None),
        }
    }
}

impl EyePlugin for DummySource {
    fn init(&self) -> GazeResult<()> {
        let mut producer = self.producer.lock();
        if producer.is_some() {
            return Ok(());
        }
        self.queue.reset();
        self.running.store(true, Ordering::Release);

        let config = self.config.get();
        let queue = self.queue.clone();
        let running = self.running.clone();
        let handle = std::thread::Builder::new()
            .name("dummy-source".into())
            .spawn(move || produce(config, queue, running))
            .map_err(gaze_core::GazeError::Io)?;
        *producer = Some(handle);
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        self.running.store(false, Ordering::Release);
        self.queue.cancel();
        if let Some(handle) = self.producer.lock().take() {
            if handle.join().is_err() {
                warn!("dummy source producer panicked");
            }
        }
        Ok(())
    }

    fn as_source(&self) -> Option<&dyn EyeSource> {
        Some(self)
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

impl EyeSource for DummySource {
    fn wait_for_sample(&self) -> Option<EyeSample> {
        self.queue.wait_and_pop()
    }

    fn cancel(&self) {
        self.queue.cancel();
    }
}

impl Configurable for DummySource {
    fn config_schema(&self) -> String {
        self.config.schema_json()
    }

    fn default_config(&self) -> String {
        self.config.default_json()
    }

    fn set_config(&self, config_json: &str) {
        self.config.set_from_json(config_json);
    }
}

fn produce(config: SourceConfig, queue: Arc<SourceQueue<EyeSample>>, running: Arc<AtomicBool>) {
    let period = Duration::from_secs_f64(1.0 / config.sample_rate_hz.max(1) as f64);
    let start = Instant::now();
    let mut tick: u64 = 0;

    while running.load(Ordering::Acquire) {
        let elapsed = start.elapsed();
        let phase = elapsed.as_secs_f32();
        let gaze = Vec2::new(
            config.amplitude_px * phase.cos(),
            config.amplitude_px * phase.sin(),
        );

        let mut sample = EyeSample {
            timestamp: elapsed.as_micros() as u64,
            ..EyeSample::default()
        };
        for eye in [&mut sample.left, &mut sample.right] {
            eye.gaze.raw = gaze;
            eye.is_valid = true;
        }
        queue.push(sample);

        tick += 1;
        let next = period
            .checked_mul(tick as u32)
            .unwrap_or(elapsed + period);
        if let Some(sleep) = next.checked_sub(elapsed) {
            std::thread::sleep(sleep);
        }
    }
}

export_plugin!(
    DummySource,
    "dummy_source",
    make_version(1, 0, 0),
    author = "gaze-rt",
    description = "Synthetic circular gaze trajectory"
);
