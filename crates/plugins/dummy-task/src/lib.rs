//! Fixation-dot task.
//!
//! Draws a central dot plus a marker at the latest gaze position and reports
//! end-of-task after a configured number of frames. Useful as a smoke-test
//! task and as the minimal example of a render plugin: render runs on the
//! render thread while consume is fed from the pipeline worker, so the
//! shared gaze state sits behind a mutex.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use gaze_core::{EyeSample, GazeResult, RenderContext, Vec2};
use gaze_plugin_api::{
    export_plugin, make_version, ConfigSlot, Configurable, EyePlugin, EyeSink, RaylibDrawHandle,
    TaskRender,
};
use parking_lot::Mutex;
use raylib::prelude::{Color, RaylibDraw};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct TaskConfig {
    /// Frames to show the dot before the task reports finished.
    duration_frames: u32,
    dot_radius_px: f32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            duration_frames: 600,
            dot_radius_px: 10.0,
        }
    }
}

#[derive(Default)]
pub struct DummyTask {
    config: ConfigSlot<TaskConfig>,
    context: Mutex<Option<RenderContext>>,
    latest_gaze: Mutex<Option<Vec2>>,
    frames: AtomicU32,
    finished: AtomicBool,
}

impl EyePlugin for DummyTask {
    fn init(&self) -> GazeResult<()> {
        Ok(())
    }

    fn reset(&self) {
        self.frames.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
        *self.latest_gaze.lock() = None;
    }

    fn shutdown(&self) -> GazeResult<()> {
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

impl TaskRender for DummyTask {
    fn set_render_context(&self, ctx: RenderContext) {
        *self.context.lock() = Some(ctx);
    }

    fn render(&self, draw: &mut RaylibDrawHandle) {
        let config = self.config.get();
        let center_x = draw.get_screen_width() / 2;
        let center_y = draw.get_screen_height() / 2;
        draw.draw_circle(center_x, center_y, config.dot_radius_px, Color::WHITE);

        if let Some(gaze) = *self.latest_gaze.lock() {
            draw.draw_circle_lines(
                center_x + gaze.x as i32,
                center_y + gaze.y as i32,
                config.dot_radius_px / 2.0,
                Color::GREEN,
            );
        }

        let frames = self.frames.fetch_add(1, Ordering::AcqRel) + 1;
        if frames >= config.duration_frames {
            self.finished.store(true, Ordering::Release);
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl EyeSink for DummyTask {
    fn consume(&self, sample: &EyeSample) -> GazeResult<()> {
        if sample.left.is_valid {
            *self.latest_gaze.lock() = Some(sample.left.gaze.raw);
        }
        Ok(())
    }
}

impl Configurable for DummyTask {
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

export_plugin!(
    DummyTask,
    "dummy_task",
    make_version(1, 0, 0),
    author = "gaze-rt",
    description = "Central fixation dot with gaze marker"
);
