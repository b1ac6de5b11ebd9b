//! The render loop. Everything in this file runs on the thread that created
//! the window; nothing else may touch the display.

use std::sync::Arc;
use std::time::Duration;

use gaze_core::messages::{MonitorInfo, ProtocolEvent, ProtocolEventMessage};
use gaze_core::{pixels_per_degree, GazeError, RenderContext};
use raylib::prelude::Color;
use raylib::consts::KeyboardKey;
use raylib::core::window::get_monitor_count;
use raylib::prelude::RaylibDraw;
use raylib::{RaylibHandle, RaylibThread};
use tracing::{error, info, warn};

use crate::broadcast::BroadcastHub;
use crate::pipeline::PipelineRuntime;
use crate::plugin::Plugin;

use super::shared::{GraphicsShared, SettingsPromise};

/// Sleep while waiting for the first graphics-settings request.
const SETTINGS_POLL: Duration = Duration::from_millis(100);

const BACKGROUND: Color = Color::new(128, 128, 128, 255);

pub struct GraphicsRuntime {
    shared: Arc<GraphicsShared>,
    pipeline: Arc<PipelineRuntime>,
    broadcast: BroadcastHub,
    window: Option<(RaylibHandle, RaylibThread)>,
    current_task: Option<Plugin>,
}

impl GraphicsRuntime {
    pub fn new(
        shared: Arc<GraphicsShared>,
        pipeline: Arc<PipelineRuntime>,
        broadcast: BroadcastHub,
    ) -> Self {
        Self {
            shared,
            pipeline,
            broadcast,
            window: None,
            current_task: None,
        }
    }

    /// Enumerate monitors through a short-lived hidden window, then tear it
    /// down again. The real window is created when settings are applied.
    pub fn init(&mut self) {
        let (mut handle, _thread) = raylib::init().size(64, 64).title("gaze-rt").build();
        handle.set_window_state(raylib::core::window::WindowState::default().set_window_hidden(true));

        let monitors = enumerate_monitors(&handle);
        info!("Enumerated {} monitor(s)", monitors.len());
        self.shared.set_monitors(monitors);
        // Dropping the handle closes the temporary window.
    }

    /// Drive the render loop until the stop flag is raised. The window stays
    /// open; call [`shutdown`](Self::shutdown) from this same thread once the
    /// other subsystems have been joined, so the window is destroyed last.
    pub fn run(&mut self) {
        while !self.shared.stop_requested() {
            if !self.shared.is_ready() {
                match self.shared.take_settings_request() {
                    Some(promise) => self.apply_settings(promise),
                    None => std::thread::sleep(SETTINGS_POLL),
                }
                continue;
            }
            self.frame();
        }
    }

    fn apply_settings(&mut self, promise: SettingsPromise) {
        let request = promise.request;
        let settings = &request.graphics_settings;

        let monitors = self.shared.monitors();
        if monitors.is_empty() {
            error!("cannot apply graphics settings: no monitors enumerated");
            let _ = promise.reply.send(Err(GazeError::Io(std::io::Error::other(
                "no monitors available",
            ))));
            return;
        }
        let Some(monitor) = monitors.get(settings.monitor_index as usize) else {
            let _ = promise.reply.send(Err(GazeError::Io(std::io::Error::other(
                format!("monitor {} does not exist", settings.monitor_index),
            ))));
            return;
        };

        let mut builder = raylib::init();
        builder
            .size(settings.width, settings.height)
            .title("gaze-rt");
        if settings.vsync {
            builder.vsync();
        }
        if settings.anti_aliasing {
            builder.msaa_4x();
        }
        let (mut handle, thread) = builder.build();

        handle.set_target_fps(settings.target_fps);
        handle.set_window_monitor(settings.monitor_index);
        handle.set_window_size(settings.width, settings.height);
        if settings.full_screen && !handle.is_window_fullscreen() {
            handle.toggle_fullscreen();
        }

        let context = RenderContext {
            view_distance_mm: request.view_distance_mm,
            screen_width_mm: monitor.width_mm as u32,
            screen_height_mm: monitor.height_mm as u32,
            ppd_x: pixels_per_degree(
                settings.width,
                monitor.width_mm as u32,
                request.view_distance_mm,
            ),
            ppd_y: pixels_per_degree(
                settings.height,
                monitor.height_mm as u32,
                request.view_distance_mm,
            ),
        };

        info!(
            "Graphics initialized: {}x{} @ {}fps on \"{}\"",
            settings.width, settings.height, settings.target_fps, monitor.name
        );
        info!(
            "Physical size {}x{} mm, view distance {} mm, PPD {:.1}x{:.1}",
            monitor.width_mm,
            monitor.height_mm,
            request.view_distance_mm,
            context.ppd_x,
            context.ppd_y
        );

        self.window = Some((handle, thread));
        self.shared.set_render_context(context);
        self.shared.set_current_settings(request);
        self.shared.mark_ready();

        // The promise resolves after the transition so a caller observing Ok
        // always sees READY.
        let _ = promise.reply.send(Ok(()));
        self.broadcast
            .protocol_event(ProtocolEventMessage::new("", ProtocolEvent::GraphicsReady, 0));
    }

    fn frame(&mut self) {
        let mut current = self.current_task.take();
        self.shared.service_mailbox(&mut current);
        self.current_task = current;

        let Some((handle, thread)) = self.window.as_mut() else {
            return;
        };

        let task = self
            .current_task
            .as_ref()
            .filter(|task| task.as_render().is_some())
            .cloned();

        match task {
            Some(task) => {
                let render = task.as_render().expect("filtered on render capability");
                {
                    let mut draw = handle.begin_drawing(thread);
                    draw.clear_background(BACKGROUND);
                    render.render(&mut draw);
                }

                let points = render.drain_calibration_points();
                if !points.is_empty() {
                    self.pipeline.push_calibration_points(&points);
                }
                if render.is_finished() {
                    self.shared.set_task_finished();
                }
            }
            None => {
                let standby = self.shared.standby_info();
                if standby.is_some() && handle.is_key_pressed(KeyboardKey::KEY_S) {
                    self.shared.raise_start_request();
                }
                let text = standby
                    .as_ref()
                    .map(|protocol_name| format!("Protocol: {protocol_name}"));
                let text_width = text.as_ref().map(|text| handle.measure_text(text, 24));
                let prompt = "Press S to start";
                let prompt_width = handle.measure_text(prompt, 30);

                let mut draw = handle.begin_drawing(thread);
                draw.clear_background(Color::BLACK);
                if let (Some(text), Some(width)) = (&text, text_width) {
                    let x = (draw.get_screen_width() - width) / 2;
                    let y = draw.get_screen_height() / 2;
                    draw.draw_text(text, x, y, 24, Color::WHITE);

                    let x = (draw.get_screen_width() - prompt_width) / 2;
                    draw.draw_text(prompt, x, y + 100, 30, Color::WHITE);
                }
            }
        }

        if handle.window_should_close() {
            self.shared.request_stop();
        }
    }

    /// Shut the current task down while the GL context is still valid, then
    /// close the window. Must run on the thread that ran [`run`](Self::run).
    pub fn shutdown(&mut self) {
        if let Some(task) = self.current_task.take() {
            task.reset();
            if let Err(err) = task.shutdown() {
                warn!("task \"{}\" failed to shut down: {err}", task.name());
            }
        }
        self.window = None;
        info!("Graphics runtime stopped");
    }
}

fn enumerate_monitors(handle: &RaylibHandle) -> Vec<MonitorInfo> {
    use raylib::core::window::{
        get_monitor_height, get_monitor_name, get_monitor_physical_height,
        get_monitor_physical_width, get_monitor_refresh_rate, get_monitor_width,
    };

    let _ = handle; // Monitor queries need a live window context.
    let count = get_monitor_count();
    (0..count)
        .map(|index| MonitorInfo {
            index,
            width_px: get_monitor_width(index),
            height_px: get_monitor_height(index),
            width_mm: get_monitor_physical_width(index),
            height_mm: get_monitor_physical_height(index),
            refresh_rate: get_monitor_refresh_rate(index),
            name: get_monitor_name(index).unwrap_or_default(),
        })
        .collect()
}
