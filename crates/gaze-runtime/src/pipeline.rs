//! Pipeline runtime: the reconfigurable chain and its pulling worker.
//!
//! Sample flow order is fixed: Source → Calibration → Filter → Stages[…] →
//! Sinks[…]. The non-sink portion only changes through [`configure`], which
//! cancels the old source before touching anything so the worker can never be
//! torn down out from under a blocked pull. Sink-list edits take only the
//! sink lock and are safe while samples are in flight; each sample is fanned
//! out to the snapshot of sinks observed when its visit began.
//!
//! [`configure`]: PipelineRuntime::configure

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use gaze_core::{CalibrationPoint, EyeSample, GazeResult};
use gaze_plugin_api::{Capability, EyeSink};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::plugin::Plugin;

/// Poll interval while no source is attached.
const IDLE_WAIT: Duration = Duration::from_millis(50);
/// Back-off after a cancelled pull so a permanently cancelled source does not
/// spin the worker.
const CANCELLED_WAIT: Duration = Duration::from_millis(1);

/// Resolved plugins for a chain replacement. Slots whose plugin does not
/// expose the expected capability are left empty with a diagnostic; the chain
/// is still considered configured.
#[derive(Default)]
pub struct ChainConfig {
    pub source: Option<Plugin>,
    pub calibration: Option<Plugin>,
    pub filter: Option<Plugin>,
    pub stages: Vec<Plugin>,
    pub sinks: Vec<Plugin>,
}

#[derive(Default)]
struct Chain {
    source: Option<Plugin>,
    calibration: Option<Plugin>,
    filter: Option<Plugin>,
    stages: Vec<Plugin>,
}

#[derive(Clone)]
struct SinkEntry {
    name: String,
    /// Present when the sink came in through `configure`, so teardown can
    /// drive its lifecycle. Task and writer sinks are lifecycle-managed by
    /// the orchestrator instead.
    plugin: Option<Plugin>,
    sink: Arc<dyn EyeSink>,
}

pub struct PipelineRuntime {
    chain: Mutex<Chain>,
    sinks: Mutex<Vec<SinkEntry>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop: AtomicBool,
}

impl Default for PipelineRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRuntime {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Chain::default()),
            sinks: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    /// Bring the pulling worker into existence and initialize whatever
    /// plugins are currently attached. Idempotent.
    pub fn init(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.stop.store(false, Ordering::Release);

        {
            let chain = self.chain.lock();
            for plugin in chain.forward_order() {
                init_plugin(&plugin);
            }
        }

        let runtime = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("pipeline".into())
            .spawn(move || runtime.worker_loop())
            .expect("failed to spawn pipeline worker");
        *worker = Some(handle);
        info!("Pipeline worker started");
    }

    /// Replace the whole chain. See module docs for the teardown ordering.
    pub fn configure(&self, config: ChainConfig) {
        // Wake any blocked pull before the chain lock is taken; cancellation
        // is sticky, so the worker cannot re-enter the old source afterwards.
        let old_source = self.chain.lock().source.clone();
        if let Some(source) = old_source.as_ref().and_then(|p| p.as_source()) {
            source.cancel();
        }

        let mut chain = self.chain.lock();

        // Shut the old plugins down in reverse flow order.
        for entry in self.sinks.lock().drain(..).rev() {
            if let Some(plugin) = entry.plugin {
                shutdown_plugin(&plugin);
            }
        }
        for plugin in chain.reverse_order() {
            shutdown_plugin(&plugin);
        }
        *chain = Chain::default();

        // Install the new chain, dropping miscast plugins from their slots.
        chain.source = expect_capability(config.source, Capability::Source);
        chain.calibration = expect_capability(config.calibration, Capability::Calibration);
        chain.filter = expect_capability(config.filter, Capability::Filter);
        chain.stages = config
            .stages
            .into_iter()
            .filter_map(|plugin| expect_capability(Some(plugin), Capability::Stage))
            .collect();

        let mut sinks = Vec::new();
        for plugin in config.sinks {
            if let Some(plugin) = expect_capability(Some(plugin), Capability::Sink) {
                sinks.push(SinkEntry {
                    name: plugin.name().to_string(),
                    sink: Arc::new(PluginSink(plugin.clone())),
                    plugin: Some(plugin),
                });
            }
        }

        // Forward-order init of everything that made it in.
        for plugin in chain.forward_order() {
            init_plugin(&plugin);
        }
        for entry in &sinks {
            if let Some(plugin) = &entry.plugin {
                init_plugin(plugin);
            }
        }
        *self.sinks.lock() = sinks;

        info!(
            source = ?chain.source.as_ref().map(Plugin::name),
            stages = chain.stages.len(),
            "Pipeline configured"
        );
    }

    /// Make `plugins` the entire sink list. Plugins without the Sink
    /// capability simply see no samples.
    pub fn replace_sinks(&self, plugins: &[Plugin]) {
        let entries = plugins
            .iter()
            .map(|plugin| SinkEntry {
                name: plugin.name().to_string(),
                plugin: None,
                sink: Arc::new(PluginSink(plugin.clone())),
            })
            .collect();
        *self.sinks.lock() = entries;
    }

    pub fn add_sink(&self, name: &str, sink: Arc<dyn EyeSink>) {
        self.sinks.lock().push(SinkEntry {
            name: name.to_string(),
            plugin: None,
            sink,
        });
    }

    pub fn remove_sinks(&self) {
        self.sinks.lock().clear();
    }

    /// Forward a calibration batch to the active calibration plugin, if any;
    /// otherwise the batch is discarded.
    pub fn push_calibration_points(&self, points: &[CalibrationPoint]) {
        let calibration = self.chain.lock().calibration.clone();
        match calibration.as_ref().and_then(|p| p.as_calibration()) {
            Some(calibration) => calibration.push_calibration_points(points),
            None => debug!("discarding {} calibration points, no calibration slot", points.len()),
        }
    }

    /// Run one sample through the chain. Public for the worker and for tests.
    pub fn process_sample(&self, mut sample: EyeSample) {
        {
            let chain = self.chain.lock();
            if let Some(calibration) = chain.calibration.as_ref().and_then(|p| p.as_calibration()) {
                calibration.calibrate(&mut sample);
            }
            if let Some(filter) = chain.filter.as_ref().and_then(|p| p.as_filter()) {
                filter.filter(&mut sample);
            }
            for stage in &chain.stages {
                if let Some(stage) = stage.as_stage() {
                    stage.process(&mut sample);
                }
            }
        }

        // Snapshot under the sink lock, release, then visit. Sinks added
        // mid-visit see the next sample.
        let snapshot: Vec<SinkEntry> = self.sinks.lock().clone();
        for entry in &snapshot {
            if let Err(err) = entry.sink.consume(&sample) {
                warn!(sink = %entry.name, "sink failed: {err}");
            }
        }
    }

    /// Stop the worker and tear the chain down.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        {
            let chain = self.chain.lock();
            if let Some(source) = chain.source.as_ref().and_then(|p| p.as_source()) {
                source.cancel();
            }
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("pipeline worker panicked");
            }
        }

        let mut chain = self.chain.lock();
        for entry in self.sinks.lock().drain(..).rev() {
            if let Some(plugin) = entry.plugin {
                shutdown_plugin(&plugin);
            }
        }
        for plugin in chain.reverse_order() {
            shutdown_plugin(&plugin);
        }
        *chain = Chain::default();
        info!("Pipeline shut down");
    }

    fn worker_loop(&self) {
        while !self.stop.load(Ordering::Acquire) {
            let source = self.chain.lock().source.clone();
            let Some(source) = source else {
                std::thread::sleep(IDLE_WAIT);
                continue;
            };
            let Some(view) = source.as_source() else {
                std::thread::sleep(IDLE_WAIT);
                continue;
            };
            match view.wait_for_sample() {
                Some(sample) => self.process_sample(sample),
                None => {
                    // Woken by cancel. Looping re-reads the chain, which
                    // blocks until any in-progress configure finishes.
                    std::thread::sleep(CANCELLED_WAIT);
                }
            }
        }
    }
}

impl Chain {
    fn forward_order(&self) -> Vec<Plugin> {
        let mut plugins = Vec::new();
        plugins.extend(self.source.clone());
        plugins.extend(self.calibration.clone());
        plugins.extend(self.filter.clone());
        plugins.extend(self.stages.iter().cloned());
        plugins
    }

    fn reverse_order(&self) -> Vec<Plugin> {
        let mut plugins = self.forward_order();
        plugins.reverse();
        plugins
    }
}

/// Sink adapter over a plugin handle, so task plugins and sink plugins share
/// the fan-out path with the persistence writer.
struct PluginSink(Plugin);

impl EyeSink for PluginSink {
    fn consume(&self, sample: &EyeSample) -> GazeResult<()> {
        match self.0.as_sink() {
            Some(sink) => sink.consume(sample),
            None => Ok(()),
        }
    }
}

fn expect_capability(plugin: Option<Plugin>, capability: Capability) -> Option<Plugin> {
    let plugin = plugin?;
    if plugin.exposes(capability) {
        Some(plugin)
    } else {
        warn!(
            "plugin \"{}\" does not expose {capability:?}, leaving the slot empty",
            plugin.name()
        );
        None
    }
}

fn init_plugin(plugin: &Plugin) {
    if let Err(err) = plugin.init() {
        warn!("plugin \"{}\" failed to init: {err}", plugin.name());
    }
}

fn shutdown_plugin(plugin: &Plugin) {
    if let Err(err) = plugin.shutdown() {
        warn!("plugin \"{}\" failed to shut down: {err}", plugin.name());
    }
}
