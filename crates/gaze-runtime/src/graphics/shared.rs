//! Cross-thread graphics state.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use gaze_core::messages::{GraphicsSettingsRequest, MonitorInfo};
use gaze_core::{GazeError, GazeResult, RenderContext};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

use crate::plugin::Plugin;

const STATE_DEFAULT: u8 = 0;
const STATE_READY: u8 = 1;

/// How long a retire request may wait for the render thread before the
/// orchestrator gives up and moves on.
const RETIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// A queued graphics-settings request with its completion promise.
pub struct SettingsPromise {
    pub request: GraphicsSettingsRequest,
    pub reply: oneshot::Sender<GazeResult<()>>,
}

/// Task hand-off across the orchestrator/render thread boundary.
pub enum TaskCommand {
    /// Publish the render context, run the plugin's `init` and make it the
    /// current task.
    Install(Plugin),
    /// Reset and shut the current task down, clear the slot and acknowledge.
    Retire { done: Sender<()> },
}

/// Everything the render loop shares with other threads: atomic flags and
/// single-mutex slots only, so no caller can block the renderer for more
/// than a frame.
pub struct GraphicsShared {
    state: AtomicU8,
    stop: AtomicBool,
    start_requested: AtomicBool,
    task_finished: AtomicBool,
    settings_slot: Mutex<Option<SettingsPromise>>,
    mailbox: Mutex<Option<TaskCommand>>,
    standby_info: Mutex<Option<String>>,
    monitors: Mutex<Vec<MonitorInfo>>,
    render_context: Mutex<Option<RenderContext>>,
    current_settings: Mutex<Option<GraphicsSettingsRequest>>,
}

impl Default for GraphicsShared {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsShared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_DEFAULT),
            stop: AtomicBool::new(false),
            start_requested: AtomicBool::new(false),
            task_finished: AtomicBool::new(false),
            settings_slot: Mutex::new(None),
            mailbox: Mutex::new(None),
            standby_info: Mutex::new(None),
            monitors: Mutex::new(Vec::new()),
            render_context: Mutex::new(None),
            current_settings: Mutex::new(None),
        }
    }

    /// True once the real window exists and a render context is published.
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_READY
    }

    pub fn mark_ready(&self) {
        self.state.store(STATE_READY, Ordering::Release);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Enqueue a settings request for the render thread. Resolves immediately
    /// with NotPermitted unless the runtime is still in its initial state,
    /// and with Busy if another request is already pending.
    pub fn apply_graphics_settings(
        &self,
        request: GraphicsSettingsRequest,
    ) -> oneshot::Receiver<GazeResult<()>> {
        let (reply, receiver) = oneshot::channel();

        if self.is_ready() {
            let _ = reply.send(Err(GazeError::NotPermitted(
                "graphics settings can only be applied before the window exists".into(),
            )));
            return receiver;
        }

        let mut slot = self.settings_slot.lock();
        if slot.is_some() {
            let _ = reply.send(Err(GazeError::Busy(
                "a graphics settings request is already pending".into(),
            )));
            return receiver;
        }
        *slot = Some(SettingsPromise { request, reply });
        receiver
    }

    pub fn take_settings_request(&self) -> Option<SettingsPromise> {
        self.settings_slot.lock().take()
    }

    /// Hand a task to the render thread. The plugin's `init` runs there
    /// before its first frame.
    pub fn set_current_task(&self, plugin: Plugin) {
        let mut mailbox = self.mailbox.lock();
        if mailbox.is_some() {
            warn!("task mailbox already occupied, replacing pending command");
        }
        *mailbox = Some(TaskCommand::Install(plugin));
    }

    /// Ask the render thread to reset and shut the current task down, and
    /// block until it has. Returns false on timeout, in which case the
    /// plugin is left installed rather than shut down off-thread.
    pub fn retire_current_task(&self) -> bool {
        let (done, ack) = bounded(1);
        {
            let mut mailbox = self.mailbox.lock();
            if matches!(*mailbox, Some(TaskCommand::Install(_))) {
                // The task never reached the render thread, so it was never
                // initialized; dropping the pending install is the whole
                // retire.
                *mailbox = None;
                self.task_finished.store(false, Ordering::Release);
                return true;
            }
            *mailbox = Some(TaskCommand::Retire { done });
        }
        match ack.recv_timeout(RETIRE_TIMEOUT) {
            Ok(()) => true,
            Err(_) => {
                warn!("render thread did not acknowledge task retire");
                false
            }
        }
    }

    /// Process at most one pending task command. Called by the render thread
    /// before each frame; `current_task` is the render thread's task slot.
    pub fn service_mailbox(&self, current_task: &mut Option<Plugin>) {
        let command = self.mailbox.lock().take();
        match command {
            Some(TaskCommand::Install(plugin)) => {
                if let Some(render) = plugin.as_render() {
                    if let Some(ctx) = self.render_context() {
                        render.set_render_context(ctx);
                    }
                }
                if let Err(err) = plugin.init() {
                    warn!("task \"{}\" failed to init: {err}", plugin.name());
                }
                self.task_finished.store(false, Ordering::Release);
                *current_task = Some(plugin);
            }
            Some(TaskCommand::Retire { done }) => {
                if let Some(task) = current_task.take() {
                    task.reset();
                    if let Err(err) = task.shutdown() {
                        warn!("task \"{}\" failed to shut down: {err}", task.name());
                    }
                }
                self.task_finished.store(false, Ordering::Release);
                let _ = done.send(());
            }
            None => {}
        }
    }

    pub fn is_current_task_finished(&self) -> bool {
        self.task_finished.load(Ordering::Acquire)
    }

    /// Fetch-and-clear variant, so one finished task triggers exactly one
    /// auto-advance.
    pub fn take_task_finished(&self) -> bool {
        self.task_finished.swap(false, Ordering::AcqRel)
    }

    pub fn set_task_finished(&self) {
        self.task_finished.store(true, Ordering::Release);
    }

    /// One-shot fetch-and-clear of the standby-screen start request.
    pub fn consume_start_request(&self) -> bool {
        self.start_requested.swap(false, Ordering::AcqRel)
    }

    pub fn raise_start_request(&self) {
        self.start_requested.store(true, Ordering::Release);
    }

    pub fn set_standby_info(&self, protocol_name: &str) {
        *self.standby_info.lock() = Some(protocol_name.to_string());
    }

    pub fn clear_standby_info(&self) {
        *self.standby_info.lock() = None;
    }

    pub fn standby_info(&self) -> Option<String> {
        self.standby_info.lock().clone()
    }

    pub fn monitors(&self) -> Vec<MonitorInfo> {
        self.monitors.lock().clone()
    }

    pub fn set_monitors(&self, monitors: Vec<MonitorInfo>) {
        *self.monitors.lock() = monitors;
    }

    pub fn render_context(&self) -> Option<RenderContext> {
        *self.render_context.lock()
    }

    pub fn set_render_context(&self, ctx: RenderContext) {
        *self.render_context.lock() = Some(ctx);
    }

    pub fn current_settings(&self) -> Option<GraphicsSettingsRequest> {
        self.current_settings.lock().clone()
    }

    pub fn set_current_settings(&self, settings: GraphicsSettingsRequest) {
        *self.current_settings.lock() = Some(settings);
    }
}
