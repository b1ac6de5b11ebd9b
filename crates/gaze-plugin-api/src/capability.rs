//! Capability traits filled by plugins.
//!
//! Capabilities are a variant-of-interfaces pattern: the instance exposes
//! `as_*` accessors returning non-owning views that live as long as the
//! instance handle. A plugin may fill several slots at once — a calibration
//! task is typically `TaskRender` + `EyeSink` + `Configurable` and emits
//! calibration point batches.
//!
//! Threading contract: `init`, `render`, `reset` and `shutdown` run on the
//! render thread when the plugin is installed as a task; `wait_for_sample`,
//! `process`, `filter`, `calibrate` and `consume` run on the pipeline worker.
//! Implementations needing state across those entry points use interior
//! mutability.

use gaze_core::{CalibrationPoint, EyeSample, GazeResult, RenderContext};
use raylib::prelude::RaylibDrawHandle;

/// Lifecycle plus capability queries. Every plugin implements this.
pub trait EyePlugin: Send + Sync {
    fn init(&self) -> GazeResult<()>;

    fn pause(&self) {}

    fn resume(&self) {}

    /// Return to the post-`init` state. Called before `shutdown` when a task
    /// ends so a later session can reuse the instance.
    fn reset(&self) {}

    fn shutdown(&self) -> GazeResult<()>;

    fn as_source(&self) -> Option<&dyn EyeSource> {
        None
    }

    fn as_calibration(&self) -> Option<&dyn Calibration> {
        None
    }

    fn as_filter(&self) -> Option<&dyn EyeFilter> {
        None
    }

    fn as_stage(&self) -> Option<&dyn EyeStage> {
        None
    }

    fn as_sink(&self) -> Option<&dyn EyeSink> {
        None
    }

    fn as_render(&self) -> Option<&dyn TaskRender> {
        None
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

/// Produces the sample stream.
pub trait EyeSource: Send + Sync {
    /// Block until the next sample is available. Returns `None` when woken by
    /// [`cancel`](Self::cancel); cancellation is sticky, so a cancelled source
    /// keeps returning `None` until it is re-initialized.
    fn wait_for_sample(&self) -> Option<EyeSample>;

    /// Wake any pending `wait_for_sample`. Must be safe to call from any
    /// thread, any number of times.
    fn cancel(&self);
}

/// Rewrites gaze fields based on learned coefficients.
pub trait Calibration: Send + Sync {
    fn push_calibration_points(&self, points: &[CalibrationPoint]);

    fn calibrate(&self, sample: &mut EyeSample);
}

/// Rewrites a sample in place; occupies the dedicated filter slot between
/// calibration and the stage list.
pub trait EyeFilter: Send + Sync {
    fn filter(&self, sample: &mut EyeSample);
}

/// Arbitrary per-sample processing. Stages run in configured order and may
/// mutate fields a later stage reads.
pub trait EyeStage: Send + Sync {
    fn process(&self, sample: &mut EyeSample);
}

/// Consumes samples. Errors are logged by the pipeline and do not stop the
/// sample visit.
pub trait EyeSink: Send + Sync {
    fn consume(&self, sample: &EyeSample) -> GazeResult<()>;
}

/// Draws one frame per iteration of the render loop.
pub trait TaskRender: Send + Sync {
    /// Published once before `init`, on the render thread.
    fn set_render_context(&self, ctx: RenderContext);

    fn render(&self, draw: &mut RaylibDrawHandle);

    /// True once the task has signalled end-of-task from `render`.
    fn is_finished(&self) -> bool;

    /// Take any calibration points emitted since the last drain. The default
    /// suits tasks that never calibrate.
    fn drain_calibration_points(&self) -> Vec<CalibrationPoint> {
        Vec::new()
    }
}

/// Accepts an opaque JSON configuration document and reports its schema and
/// default. A document that fails to parse reverts the plugin to its default
/// configuration (see [`ConfigSlot`](crate::ConfigSlot)).
pub trait Configurable: Send + Sync {
    fn config_schema(&self) -> String;

    fn default_config(&self) -> String;

    fn set_config(&self, config_json: &str);
}

/// Capability kinds, used for registry listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Source,
    Calibration,
    Filter,
    Stage,
    Sink,
    Render,
    Configurable,
}

impl Capability {
    /// Whether `plugin` exposes this capability.
    pub fn exposed_by(self, plugin: &dyn EyePlugin) -> bool {
        match self {
            Capability::Source => plugin.as_source().is_some(),
            Capability::Calibration => plugin.as_calibration().is_some(),
            Capability::Filter => plugin.as_filter().is_some(),
            Capability::Stage => plugin.as_stage().is_some(),
            Capability::Sink => plugin.as_sink().is_some(),
            Capability::Render => plugin.as_render().is_some(),
            Capability::Configurable => plugin.as_configurable().is_some(),
        }
    }
}
