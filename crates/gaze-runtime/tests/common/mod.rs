//! Mock plugins shared by the integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gaze_core::{CalibrationPoint, EyeSample, GazeResult, RenderContext};
use gaze_plugin_api::{
    Calibration, Configurable, EyeFilter, EyePlugin, EyeSink, EyeSource, EyeStage, SourceQueue,
    TaskRender,
};
use gaze_runtime::Plugin;
use parking_lot::Mutex;
use raylib::prelude::RaylibDrawHandle;

/// Source whose samples are pushed by the test through a shared queue.
pub struct ScriptedSource {
    pub queue: Arc<SourceQueue<EyeSample>>,
}

impl ScriptedSource {
    pub fn plugin(name: &str) -> (Plugin, Arc<SourceQueue<EyeSample>>) {
        let queue = Arc::new(SourceQueue::new(256));
        let plugin = Plugin::from_boxed(
            name,
            1,
            Box::new(Self {
                queue: queue.clone(),
            }),
        );
        (plugin, queue)
    }
}

impl EyePlugin for ScriptedSource {
    fn init(&self) -> GazeResult<()> {
        self.queue.reset();
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        self.queue.cancel();
        Ok(())
    }

    fn as_source(&self) -> Option<&dyn EyeSource> {
        Some(self)
    }
}

impl EyeSource for ScriptedSource {
    fn wait_for_sample(&self) -> Option<EyeSample> {
        self.queue.wait_and_pop()
    }

    fn cancel(&self) {
        self.queue.cancel();
    }
}

/// Records every entry point invocation into a shared journal, so tests can
/// assert visit order across the whole chain.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct JournalStage {
    label: String,
    journal: Journal,
}

impl JournalStage {
    pub fn plugin(label: &str, journal: &Journal) -> Plugin {
        Plugin::from_boxed(
            label,
            1,
            Box::new(Self {
                label: label.to_string(),
                journal: journal.clone(),
            }),
        )
    }
}

impl EyePlugin for JournalStage {
    fn init(&self) -> GazeResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        self.journal.lock().push(format!("shutdown:{}", self.label));
        Ok(())
    }

    fn as_stage(&self) -> Option<&dyn EyeStage> {
        Some(self)
    }
}

impl EyeStage for JournalStage {
    fn process(&self, _sample: &mut EyeSample) {
        self.journal.lock().push(format!("stage:{}", self.label));
    }
}

pub struct JournalFilter {
    journal: Journal,
}

impl JournalFilter {
    pub fn plugin(journal: &Journal) -> Plugin {
        Plugin::from_boxed(
            "filter",
            1,
            Box::new(Self {
                journal: journal.clone(),
            }),
        )
    }
}

impl EyePlugin for JournalFilter {
    fn init(&self) -> GazeResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        Ok(())
    }

    fn as_filter(&self) -> Option<&dyn EyeFilter> {
        Some(self)
    }
}

impl EyeFilter for JournalFilter {
    fn filter(&self, _sample: &mut EyeSample) {
        self.journal.lock().push("filter".to_string());
    }
}

pub struct JournalCalibration {
    journal: Journal,
    pub points: Arc<Mutex<Vec<CalibrationPoint>>>,
}

impl JournalCalibration {
    pub fn plugin(journal: &Journal) -> (Plugin, Arc<Mutex<Vec<CalibrationPoint>>>) {
        let points = Arc::new(Mutex::new(Vec::new()));
        let plugin = Plugin::from_boxed(
            "calibration",
            1,
            Box::new(Self {
                journal: journal.clone(),
                points: points.clone(),
            }),
        );
        (plugin, points)
    }
}

impl EyePlugin for JournalCalibration {
    fn init(&self) -> GazeResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        Ok(())
    }

    fn as_calibration(&self) -> Option<&dyn Calibration> {
        Some(self)
    }
}

impl Calibration for JournalCalibration {
    fn push_calibration_points(&self, points: &[CalibrationPoint]) {
        self.points.lock().extend_from_slice(points);
    }

    fn calibrate(&self, _sample: &mut EyeSample) {
        self.journal.lock().push("calibrate".to_string());
    }
}

/// Sink collecting every sample it sees.
pub struct CollectingSink {
    pub samples: Arc<Mutex<Vec<EyeSample>>>,
}

impl CollectingSink {
    pub fn plugin(name: &str) -> (Plugin, Arc<Mutex<Vec<EyeSample>>>) {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let plugin = Plugin::from_boxed(
            name,
            1,
            Box::new(Self {
                samples: samples.clone(),
            }),
        );
        (plugin, samples)
    }

    pub fn shared() -> (Arc<dyn EyeSink>, Arc<Mutex<Vec<EyeSample>>>) {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink: Arc<dyn EyeSink> = Arc::new(Self {
            samples: samples.clone(),
        });
        (sink, samples)
    }
}

impl EyePlugin for CollectingSink {
    fn init(&self) -> GazeResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        Ok(())
    }

    fn as_sink(&self) -> Option<&dyn EyeSink> {
        Some(self)
    }
}

impl EyeSink for CollectingSink {
    fn consume(&self, sample: &EyeSample) -> GazeResult<()> {
        self.samples.lock().push(*sample);
        Ok(())
    }
}

/// Sink that always fails; the pipeline must log and move on.
pub struct FailingSink;

impl FailingSink {
    pub fn plugin(name: &str) -> Plugin {
        Plugin::from_boxed(name, 1, Box::new(Self))
    }
}

impl EyePlugin for FailingSink {
    fn init(&self) -> GazeResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        Ok(())
    }

    fn as_sink(&self) -> Option<&dyn EyeSink> {
        Some(self)
    }
}

impl EyeSink for FailingSink {
    fn consume(&self, _sample: &EyeSample) -> GazeResult<()> {
        Err(gaze_core::GazeError::Busy("buffer full".into()))
    }
}

/// Render-capable task plugin for orchestrator tests. Never actually draws;
/// the headless tests have no render loop, only a mailbox-servicing thread.
pub struct MockTask {
    pub inited: Arc<AtomicBool>,
    pub shutdown_called: Arc<AtomicBool>,
    pub samples: Arc<Mutex<Vec<EyeSample>>>,
    pub last_config: Arc<Mutex<Option<String>>>,
}

pub struct MockTaskProbe {
    pub inited: Arc<AtomicBool>,
    pub shutdown_called: Arc<AtomicBool>,
    pub samples: Arc<Mutex<Vec<EyeSample>>>,
    pub last_config: Arc<Mutex<Option<String>>>,
}

impl MockTask {
    pub fn plugin(name: &str) -> (Plugin, MockTaskProbe) {
        let task = Self {
            inited: Arc::new(AtomicBool::new(false)),
            shutdown_called: Arc::new(AtomicBool::new(false)),
            samples: Arc::new(Mutex::new(Vec::new())),
            last_config: Arc::new(Mutex::new(None)),
        };
        let probe = MockTaskProbe {
            inited: task.inited.clone(),
            shutdown_called: task.shutdown_called.clone(),
            samples: task.samples.clone(),
            last_config: task.last_config.clone(),
        };
        (Plugin::from_boxed(name, 1, Box::new(task)), probe)
    }
}

impl EyePlugin for MockTask {
    fn init(&self) -> GazeResult<()> {
        self.inited.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) -> GazeResult<()> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn as_render(&self) -> Option<&dyn TaskRender> {
        Some(self)
    }

    fn as_sink(&self) -> Option<&dyn EyeSink> {
        Some(self)
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

impl TaskRender for MockTask {
    fn set_render_context(&self, _ctx: RenderContext) {}

    fn render(&self, _draw: &mut RaylibDrawHandle) {}

    fn is_finished(&self) -> bool {
        false
    }
}

impl EyeSink for MockTask {
    fn consume(&self, sample: &EyeSample) -> GazeResult<()> {
        self.samples.lock().push(*sample);
        Ok(())
    }
}

impl Configurable for MockTask {
    fn config_schema(&self) -> String {
        "{}".to_string()
    }

    fn default_config(&self) -> String {
        "{}".to_string()
    }

    fn set_config(&self, config_json: &str) {
        *self.last_config.lock() = Some(config_json.to_string());
    }
}

/// Build a sample with the given timestamp.
pub fn sample_at(timestamp: u64) -> EyeSample {
    EyeSample {
        timestamp,
        ..EyeSample::default()
    }
}
